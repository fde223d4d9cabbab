use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SKIP_ICON: Emoji<'_, '_> = Emoji("⏭️  ", "");
pub static RUNNING_ICON: Emoji<'_, '_> = Emoji("⏳ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_skipped(label: &str, msg: &str) {
    println!("  {} {}: {}", SKIP_ICON, style(label).dim(), style(msg).dim());
}

pub fn print_running(label: &str) {
    println!("  {} {}: running", RUNNING_ICON, style(label).bold());
}

/// A titled group of `command  description` rows, used by the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows.push((name.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        for (name, description) in &self.rows {
            println!("   {:<14} {}", style(name).green(), description);
        }
    }
}

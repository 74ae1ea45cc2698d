use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Color a configuration diff line by line.
///
/// Additions are green, removals red, moves yellow; everything else is left
/// untouched. The trailing newline, if present, survives the round trip.
pub fn color_diff(diff: &str) -> String {
    let mut lines = Vec::new();
    for line in diff.lines() {
        let colored = if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with('!') {
            line.yellow().to_string()
        } else {
            line.to_string()
        };
        lines.push(colored);
    }

    let mut out = lines.join("\n");
    if diff.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_diff_preserves_plain_lines() {
        colored::control::set_override(false);
        let diff = "[edit system]\n+ host-name leaf1;\n- host-name old;\n";
        let colored = color_diff(diff);
        assert!(colored.contains("[edit system]"));
        assert!(colored.ends_with('\n'));
    }

    #[test]
    fn test_color_diff_no_trailing_newline() {
        colored::control::set_override(false);
        assert_eq!(color_diff("+ a"), "+ a");
    }
}

//! Terminal detection.

use std::io::IsTerminal;

/// Whether human output should carry ANSI styles.
///
/// Off when `--no-color` is passed, `NO_COLOR` is set, `TERM=dumb`, or stdout
/// is not a terminal.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    if no_color_flag || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
        return false;
    }
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_disables_color() {
        assert!(!should_use_color(true));
    }
}

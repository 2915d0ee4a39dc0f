//! AppleScript snippets and parsers for their output.
//!
//! The parsers are platform-independent so they can be tested anywhere.

use crate::platform::types::BrowserTab;

/// Separator placed between URL and title in the tab query.
pub const TAB_SEPARATOR: &str = "|||";

pub const FRONTMOST_APP_SCRIPT: &str =
    r#"tell application "System Events" to get name of first application process whose frontmost is true"#;

pub const FRONT_WINDOW_TITLE_SCRIPT: &str = r#"tell application "System Events" to get name of front window of first application process whose frontmost is true"#;

/// Script reading URL and title of the active tab of a Chromium-family browser.
pub fn browser_tab_script(browser_app: &str) -> String {
    let app = browser_app.replace('"', "");
    format!(
        "tell application \"{app}\" to set tabInfo to (get URL of active tab of front window) & \"{TAB_SEPARATOR}\" & (get title of active tab of front window)\nreturn tabInfo"
    )
}

/// Trimmed single-value output, `None` when blank.
pub fn parse_single_value(stdout: &str) -> Option<String> {
    let value = stdout.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Split `url|||title` output. A missing URL yields `None`.
pub fn parse_tab_info(stdout: &str) -> Option<BrowserTab> {
    let (url, title) = stdout.trim().split_once(TAB_SEPARATOR)?;
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    let title = title.trim();
    Some(BrowserTab {
        url: url.to_string(),
        title: (!title.is_empty()).then(|| title.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tab_info() {
        let tab = parse_tab_info("https://example.com/a#b|||Example Page\n").unwrap();
        assert_eq!(tab.url, "https://example.com/a#b");
        assert_eq!(tab.title.as_deref(), Some("Example Page"));

        let untitled = parse_tab_info("https://example.com/|||  ").unwrap();
        assert_eq!(untitled.title, None);

        assert!(parse_tab_info("no separator here").is_none());
        assert!(parse_tab_info("|||Only a title").is_none());
    }

    #[test]
    fn test_parse_single_value() {
        assert_eq!(parse_single_value(" Safari\n").as_deref(), Some("Safari"));
        assert_eq!(parse_single_value("  \n"), None);
    }

    #[test]
    fn test_browser_script_names_app() {
        let script = browser_tab_script("Google Chrome");
        assert!(script.contains("tell application \"Google Chrome\""));
        assert!(script.contains(TAB_SEPARATOR));
    }
}

//! `TERM_PROGRAM` -> host-terminal bundle identifier mapping, used to fill
//! the `init` hook's `bundle` field. Ported from `util.c:get_term_bundle`.

pub fn get_term_bundle<F>(getenv: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let Some(term_program) = getenv("TERM_PROGRAM") else {
        return "unknown".to_string();
    };

    match term_program.as_str() {
        "iTerm.app" => return "com.googlecode.iterm2".to_string(),
        "Apple_Terminal" => return "com.apple.Terminal".to_string(),
        "Hyper" => return "co.zeit.hyper".to_string(),
        "vscode" => {
            return match getenv("TERM_PROGRAM_VERSION") {
                Some(v) if v.contains("insiders") => "com.microsoft.vscode-insiders".to_string(),
                _ => "com.microsoft.vscode".to_string(),
            };
        }
        _ => {}
    }

    getenv("TERM_BUNDLE_IDENTIFIER").unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_terminals() {
        assert_eq!(
            get_term_bundle(|k| (k == "TERM_PROGRAM").then(|| "iTerm.app".to_string())),
            "com.googlecode.iterm2"
        );
    }

    #[test]
    fn vscode_insiders() {
        let env = |k: &str| match k {
            "TERM_PROGRAM" => Some("vscode".to_string()),
            "TERM_PROGRAM_VERSION" => Some("1.2.3-insiders".to_string()),
            _ => None,
        };
        assert_eq!(get_term_bundle(env), "com.microsoft.vscode-insiders");
    }

    #[test]
    fn unknown_when_unset() {
        assert_eq!(get_term_bundle(|_| None), "unknown");
    }
}

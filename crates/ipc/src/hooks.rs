//! Hook JSON shapes published on the JSON hook channel. Field naming
//! follows the latest spelling where the original revisions disagreed
//! (`editBuffer`, `integrationVersion`).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    pub session_id: String,
    pub pid: String,
    pub hostname: String,
    pub ttys: String,
    pub integration_version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    Init { context: HookContext, bundle: String },
    Prompt { context: HookContext },
    PreExec { context: HookContext },
    EditBuffer { text: String, cursor: usize, context: HookContext },
}

#[derive(Debug, Clone, Serialize)]
pub struct HookEnvelope {
    pub hook: HookKind,
}

impl HookEnvelope {
    pub fn new(kind: HookKind) -> Self {
        HookEnvelope { hook: kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HookContext {
        HookContext {
            session_id: "s1".into(),
            pid: "123".into(),
            hostname: "host".into(),
            ttys: "/dev/ttys000".into(),
            integration_version: "9".into(),
        }
    }

    #[test]
    fn init_hook_shape() {
        let env = HookEnvelope::new(HookKind::Init { context: context(), bundle: "com.apple.Terminal".into() });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["hook"]["init"]["bundle"], "com.apple.Terminal");
        assert_eq!(json["hook"]["init"]["context"]["sessionId"], "s1");
    }

    #[test]
    fn edit_buffer_hook_shape() {
        let env = HookEnvelope::new(HookKind::EditBuffer { text: "ls \"now\"".into(), cursor: 3, context: context() });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["hook"]["editBuffer"]["text"], "ls \"now\"");
        assert_eq!(json["hook"]["editBuffer"]["cursor"], 3);
        assert_eq!(json["hook"]["editBuffer"]["context"]["integrationVersion"], "9");
    }

    #[test]
    fn pre_exec_hook_shape() {
        let env = HookEnvelope::new(HookKind::PreExec { context: context() });
        let json = serde_json::to_value(&env).unwrap();
        assert!(json["hook"]["preExec"]["context"].is_object());
    }
}

//! Agent command contract (§4.1).

use crate::crds::run::AgentKind;

/// `command, args` for the main container.
///
/// ClaudeKind: `claude --permission-mode bypassPermissions`, with
/// `--print --prompt <prompt>` appended when a prompt is supplied.
/// OpencodeKind: `opencode`, with arguments copied verbatim from the
/// resolved provider's `cliArgs`.
pub fn build_agent_command(
    agent_kind: AgentKind,
    prompt: Option<&str>,
    provider_cli_args: &[String],
) -> (Vec<String>, Vec<String>) {
    match agent_kind {
        AgentKind::ClaudeKind => {
            let mut args = vec![
                "--permission-mode".to_string(),
                "bypassPermissions".to_string(),
            ];
            if let Some(p) = prompt.filter(|p| !p.is_empty()) {
                args.push("--print".to_string());
                args.push("--prompt".to_string());
                args.push(p.to_string());
            }
            (vec!["claude".to_string()], args)
        }
        AgentKind::OpencodeKind => (vec!["opencode".to_string()], provider_cli_args.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_without_prompt() {
        let (cmd, args) = build_agent_command(AgentKind::ClaudeKind, None, &[]);
        assert_eq!(cmd, vec!["claude"]);
        assert_eq!(args, vec!["--permission-mode", "bypassPermissions"]);
    }

    #[test]
    fn claude_with_prompt() {
        let (_, args) = build_agent_command(AgentKind::ClaudeKind, Some("do the thing"), &[]);
        assert_eq!(
            args,
            vec![
                "--permission-mode",
                "bypassPermissions",
                "--print",
                "--prompt",
                "do the thing"
            ]
        );
    }

    #[test]
    fn opencode_uses_provider_cli_args() {
        let cli_args = vec!["--model".to_string(), "gpt-5".to_string()];
        let (cmd, args) = build_agent_command(AgentKind::OpencodeKind, None, &cli_args);
        assert_eq!(cmd, vec!["opencode"]);
        assert_eq!(args, cli_args);
    }
}

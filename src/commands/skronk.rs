//! The `/skronk` command.

use serde_json::Value;

use super::{
    CommandContext, CommandDefinition, CommandOption, Invocation, OptionKind, SlashCommand,
};
use crate::error::CommandError;
use crate::penalty::PenaltyRequest;
use crate::platform::{Responder, UserId};

const OPT_NAME: &str = "name";
const OPT_MESSAGE: &str = "message";
const OPT_TIMEOUT: &str = "timeout";

static DEFINITION: CommandDefinition = CommandDefinition {
    name: "skronk",
    description: "Skronk a user",
    guild_only: true,
    options: &[
        CommandOption {
            name: OPT_NAME,
            description: "The user to skronk",
            kind: OptionKind::User,
            required: true,
        },
        CommandOption {
            name: OPT_MESSAGE,
            description: "The reason for the skronking",
            kind: OptionKind::String,
            required: false,
        },
        CommandOption {
            name: OPT_TIMEOUT,
            description: "How long to skronk",
            kind: OptionKind::String,
            required: false,
        },
    ],
};

/// Applies the penalty marker to a member for a while.
#[derive(Debug, Clone, Copy)]
pub struct Skronk;

#[async_trait::async_trait]
impl SlashCommand for Skronk {
    fn definition(&self) -> &'static CommandDefinition {
        &DEFINITION
    }

    async fn process(
        &self,
        ctx: &CommandContext,
        invocation: &Invocation,
        responder: &dyn Responder,
    ) -> Result<(), CommandError> {
        let request = parse_request(invocation)?;
        ctx.controller.trigger(&request, responder).await?;
        Ok(())
    }
}

/// Builds a penalty request from the invocation's options.
///
/// # Errors
///
/// Fails when `name` is missing or no option holds a usable value.
pub fn parse_request(invocation: &Invocation) -> Result<PenaltyRequest, CommandError> {
    let raw_target = invocation
        .option(OPT_NAME)
        .ok_or_else(|| CommandError::MissingOption(OPT_NAME.to_string()))?;
    let target = parse_user(raw_target).ok_or_else(|| invalid(OPT_NAME, raw_target))?;

    let mut request = PenaltyRequest::new(invocation.group, invocation.user, target);
    if let Some(message) = invocation.option(OPT_MESSAGE) {
        let text = message.as_str().ok_or_else(|| invalid(OPT_MESSAGE, message))?;
        request = request.with_reason(text);
    }
    if let Some(timeout) = invocation.option(OPT_TIMEOUT) {
        let text = match timeout {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(invalid(OPT_TIMEOUT, other)),
        };
        request = request.with_timeout(text);
    }
    Ok(request)
}

/// Accepts a numeric id, a numeric string, or a mention (`<@3>`, `<@!3>`).
fn parse_user(value: &Value) -> Option<UserId> {
    match value {
        Value::Number(n) => n.as_u64().map(UserId),
        Value::String(s) => {
            let s = s.trim();
            let id = s
                .strip_prefix("<@")
                .and_then(|rest| rest.strip_suffix('>'))
                .map_or(s, |inner| inner.strip_prefix('!').unwrap_or(inner));
            id.parse().ok().map(UserId)
        }
        _ => None,
    }
}

fn invalid(name: &str, value: &Value) -> CommandError {
    CommandError::InvalidOption {
        name: name.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::platform::GroupId;

    fn invocation(options: Value) -> Invocation {
        let options = options
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_else(BTreeMap::new);
        Invocation {
            id: "test".to_string(),
            command: "skronk".to_string(),
            group: Some(GroupId(1)),
            user: UserId(5),
            options,
        }
    }

    #[test]
    fn parses_all_options() {
        let request =
            parse_request(&invocation(json!({"name": 3, "message": "rude", "timeout": "2m"})))
                .unwrap();
        assert_eq!(request.group, Some(GroupId(1)));
        assert_eq!(request.requester, UserId(5));
        assert_eq!(request.target, UserId(3));
        assert_eq!(request.reason.as_deref(), Some("rude"));
        assert_eq!(request.timeout(60), 120);
    }

    #[test]
    fn target_accepts_string_and_mentions() {
        for raw in [json!("3"), json!("<@3>"), json!("<@!3>"), json!(" <@3> ")] {
            let request = parse_request(&invocation(json!({ "name": raw }))).unwrap();
            assert_eq!(request.target, UserId(3), "input {raw}");
        }
    }

    #[test]
    fn missing_target_is_an_error() {
        let err = parse_request(&invocation(json!({"timeout": "10s"}))).unwrap_err();
        assert!(matches!(err, CommandError::MissingOption(ref n) if n == "name"));
        assert_eq!(err.kind(), "MissingOptionError");
    }

    #[test]
    fn garbage_target_is_invalid() {
        for raw in [json!("bob"), json!(-4), json!(true), json!("<@x>")] {
            let err = parse_request(&invocation(json!({ "name": raw }))).unwrap_err();
            assert!(matches!(err, CommandError::InvalidOption { .. }), "input {raw}");
        }
    }

    #[test]
    fn numeric_timeout_is_seconds() {
        let request = parse_request(&invocation(json!({"name": 3, "timeout": 45}))).unwrap();
        assert_eq!(request.timeout_input.as_deref(), Some("45"));
        assert_eq!(request.timeout(60), 45);
    }

    #[test]
    fn absent_options_leave_defaults() {
        let request = parse_request(&invocation(json!({"name": 3}))).unwrap();
        assert!(request.reason.is_none());
        assert_eq!(request.timeout(60), 60);
    }
}

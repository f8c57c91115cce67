//! `send`: one command to one device.

use serde_json::Value;
use tuyabridge_core::Bridge;

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

/// Parse a command value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

pub async fn handle(args: &SendArgs, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    let value = parse_value(&args.value);
    let resp = bridge.send_command(&args.device, &args.code, value).await?;

    if !resp.success {
        return Err(CliError::Api {
            message: resp.msg.clone().unwrap_or_else(|| "command rejected".into()),
            code: resp.code,
        });
    }

    let rendered = output::render_single(global.output, &resp, |_| {
        format!("sent {}={} to {}", args.code, args.value, args.device)
    });
    output::print_output(&rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_first() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("\"white\""), json!("white"));
        assert_eq!(parse_value("white"), json!("white"));
        assert_eq!(parse_value("{\"h\":10}"), json!({ "h": 10 }));
    }
}

//! Robot-mode output (JSON).
//!
//! Every report type serializes directly; this module only picks compact or
//! pretty encoding.

use serde::Serialize;

use crate::error::Result;

/// Render a report as compact JSON.
pub fn render_json<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}

/// Render a report as pretty JSON.
pub fn render_json_pretty<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(output)?)
}

/// Render with the encoding selected by `--pretty`.
pub fn render<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    if pretty {
        render_json_pretty(output)
    } else {
        render_json(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::effective_count;
    use crate::core::models::Granularity;

    #[test]
    fn compact_and_pretty_decode_to_the_same_value() {
        let value = serde_json::json!({ "zoom": effective_count(Granularity::Hour, 1000) });
        let compact: serde_json::Value = serde_json::from_str(&render(&value, false).unwrap()).unwrap();
        let pretty: serde_json::Value = serde_json::from_str(&render(&value, true).unwrap()).unwrap();
        assert_eq!(compact, pretty);
        assert_eq!(compact["zoom"], 168);
        assert!(!render(&value, false).unwrap().contains('\n'));
    }
}

use runscope_logs::{LogLine, RetrievalError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    #[serde(default)]
    status: Option<String>,
    data: Option<QueryRangeData>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default, rename = "resultType")]
    result_type: Option<String>,
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    /// `[timestamp_nanos, line]`, plus structured metadata on Loki 3
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Extract `data.result[*].values[*]` as log lines, in response order
pub fn parse_query_range(body: &str) -> Result<Vec<LogLine>, RetrievalError> {
    let response: QueryRangeResponse = serde_json::from_str(body)
        .map_err(|e| RetrievalError::MalformedResponse(e.to_string()))?;

    if let Some(status) = response.status.as_deref() {
        if status != "success" {
            return Err(RetrievalError::MalformedResponse(format!(
                "query status '{}'",
                status
            )));
        }
    }

    let Some(data) = response.data else {
        return Ok(Vec::new());
    };
    if let Some(result_type) = data.result_type.as_deref() {
        if result_type != "streams" {
            return Err(RetrievalError::MalformedResponse(format!(
                "expected streams, got '{}'",
                result_type
            )));
        }
    }

    let mut lines = Vec::new();
    for stream in data.result {
        for value in stream.values {
            lines.push(parse_value(&value)?);
        }
    }
    Ok(lines)
}

fn parse_value(value: &[Value]) -> Result<LogLine, RetrievalError> {
    let (Some(timestamp), Some(text)) = (
        value.first().and_then(Value::as_str),
        value.get(1).and_then(Value::as_str),
    ) else {
        return Err(RetrievalError::MalformedResponse(format!(
            "expected [timestamp, line], got {}",
            Value::from(value.to_vec())
        )));
    };
    let nanos: u64 = timestamp.parse().map_err(|_| {
        RetrievalError::MalformedResponse(format!("invalid timestamp '{}'", timestamp))
    })?;
    Ok(LogLine::new(nanos, text))
}

use std::fs;
use std::time::Duration;

use pipemux_protocol::{connect, ContentFeed, Request, APPLICATION_JSON_UTF8, CONTENT_TYPE};

use crate::cmd::SendArgs;
use crate::exit::{protocol_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_response, OutputFormat};

const OCTET_STREAM: &str = "application/octet-stream";

/// Exits 0 for a 2xx response and 1 for any other status.
pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args)?;

    let connection = tokio::time::timeout(timeout, connect(&args.base))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("connect timed out after {}", args.timeout)))?
        .map_err(|err| protocol_error("connect failed", err))?;

    let response = connection
        .send_request_timeout(&request, timeout)
        .await
        .map_err(|err| protocol_error("request failed", err))?;
    tracing::debug!(
        status = response.status,
        feeds = response.feeds.len(),
        "response received"
    );
    print_response(&response, format);

    Ok(if response.is_success() { SUCCESS } else { FAILURE })
}

fn build_request(args: &SendArgs) -> CliResult<Request> {
    let mut request = Request::new(args.method.to_ascii_uppercase(), args.path.clone());
    for (name, value) in &args.headers {
        request.add_header(name.clone(), value.clone());
    }
    if let Some(feed) = resolve_body(args)? {
        request = request.with_feed(feed);
    }
    Ok(request)
}

fn resolve_body(args: &SendArgs) -> CliResult<Option<ContentFeed>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        let feed = ContentFeed::new(json.clone().into_bytes())
            .with_header(CONTENT_TYPE, APPLICATION_JSON_UTF8);
        return Ok(Some(feed));
    }
    if let Some(data) = &args.data {
        return Ok(Some(ContentFeed::text(data.clone())));
    }
    if let Some(path) = &args.file {
        let body = fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return Ok(Some(ContentFeed::new(body).with_header(CONTENT_TYPE, OCTET_STREAM)));
    }
    Ok(None)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pipemux_protocol::TEXT_PLAIN_UTF8;

    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            base: PathBuf::from("/tmp/app/bot"),
            method: "post".to_string(),
            path: "/x".to_string(),
            headers: vec![("X-Trace".to_string(), "7".to_string())],
            json: None,
            data: None,
            file: None,
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn build_request_uppercases_method_and_keeps_headers() {
        let mut args = args();
        args.data = Some("hello".to_string());
        let request = build_request(&args).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/x");
        assert_eq!(request.headers.get("X-Trace").map(String::as_str), Some("7"));
        assert_eq!(request.feeds.len(), 1);
        assert_eq!(
            request.feeds[0].headers.get(CONTENT_TYPE).map(String::as_str),
            Some(TEXT_PLAIN_UTF8)
        );
    }

    #[test]
    fn json_body_is_validated_and_tagged() {
        let mut args = args();
        args.json = Some("{\"a\":1}".to_string());
        let request = build_request(&args).unwrap();
        assert_eq!(
            request.feeds[0].headers.get(CONTENT_TYPE).map(String::as_str),
            Some(APPLICATION_JSON_UTF8)
        );

        args.json = Some("{nope".to_string());
        assert_eq!(build_request(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn no_body_sends_no_feeds() {
        let request = build_request(&args()).unwrap();
        assert!(request.feeds.is_empty());
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}

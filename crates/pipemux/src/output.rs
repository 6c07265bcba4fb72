use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipemux_protocol::{Headers, ReceiveResponse, CONTENT_TYPE};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FeedOutput<'a> {
    id: u8,
    headers: &'a Headers,
    size: usize,
    body: String,
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    status: u16,
    headers: &'a Headers,
    feeds: Vec<FeedOutput<'a>>,
}

pub fn print_response(response: &ReceiveResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                status: response.status,
                headers: &response.headers,
                feeds: response
                    .feeds
                    .iter()
                    .map(|feed| FeedOutput {
                        id: feed.id,
                        headers: &feed.headers,
                        size: feed.content.len(),
                        body: body_preview(&feed.content),
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "FEED", "TYPE", "SIZE", "BODY"]);
            if response.feeds.is_empty() {
                table.add_row(vec![
                    response.status.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "0".to_string(),
                    String::new(),
                ]);
            }
            for feed in &response.feeds {
                table.add_row(vec![
                    response.status.to_string(),
                    feed.id.to_string(),
                    content_type(&feed.headers).to_string(),
                    feed.content.len().to_string(),
                    body_preview(&feed.content),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} headers={} feeds={}",
                response.status,
                response.headers.len(),
                response.feeds.len()
            );
            for feed in &response.feeds {
                println!(
                    "feed={} type={} size={} body={}",
                    feed.id,
                    content_type(&feed.headers),
                    feed.content.len(),
                    body_preview(&feed.content)
                );
            }
        }
        OutputFormat::Raw => {
            if let Some(feed) = response.feeds.first() {
                print_raw(&feed.content);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn content_type(headers: &Headers) -> &str {
    headers.get(CONTENT_TYPE).map_or("-", String::as_str)
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

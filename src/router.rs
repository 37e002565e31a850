//! URL routing, target demux, range/format parse, conditional GET.
//!
//! `parse_rest` is a small hand-written parser over the URL grammar rather
//! than a regex, since the whole space is a handful of fixed suffixes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{TimeZone, Utc};

use crate::clock::Clock;
use crate::format::{FormatKind, Formatter, RowId, TargetConfig};
use crate::index::Index;
use crate::model::Ymd;
use crate::stalker::Stalker;

pub struct TargetState {
    pub index: Arc<Index>,
    pub config: TargetConfig,
}

pub struct RouterState {
    pub targets: HashMap<String, TargetState>,
    pub stalker: Arc<Stalker>,
    pub clock: Arc<dyn Clock>,
}

pub fn build_router(state: Arc<RouterState>) -> axum::Router {
    axum::Router::new()
        .route("/log.css", get(serve_stylesheet))
        .route("/{target}", get(serve_empty))
        .route("/{target}/", get(serve_empty))
        .route("/{target}/stalker.ws", get(ws_handler))
        .route("/{target}/{*rest}", get(serve))
        .with_state(state)
}

const STYLESHEET: &str = include_str!("log.css");

async fn serve_stylesheet() -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/css; charset=utf-8")],
        STYLESHEET,
    )
        .into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Index { year: Option<i32> },
    Month { year: i32, month: u32, format: FormatKind },
    Day { year: i32, month: u32, day: u32, format: FormatKind },
    Stalker { format: FormatKind },
}

fn parse_rest(rest: &str) -> Option<Route> {
    if rest.is_empty() || rest == "all.html" {
        return Some(Route::Index { year: None });
    }
    if let Some(stem) = rest.strip_suffix(".html") {
        if let Ok(year) = stem.parse::<i32>() {
            return Some(Route::Index { year: Some(year) });
        }
    }

    for (suffix, format) in [
        ("-raw.txt", FormatKind::Raw),
        (".html", FormatKind::Html),
        (".txt", FormatKind::Text),
    ] {
        let Some(stem) = rest.strip_suffix(suffix) else {
            continue;
        };
        if stem == "stalker" {
            return Some(Route::Stalker { format });
        }
        let parts: Vec<&str> = stem.split('-').collect();
        match parts.as_slice() {
            [y, m, d] => {
                if let (Ok(year), Ok(month), Ok(day)) = (y.parse(), m.parse(), d.parse()) {
                    return Some(Route::Day { year, month, day, format });
                }
            }
            [y, m] => {
                if let (Ok(year), Ok(month)) = (y.parse(), m.parse()) {
                    return Some(Route::Month { year, month, format });
                }
            }
            _ => {}
        }
    }
    None
}

async fn serve_empty(State(state): State<Arc<RouterState>>, Path(target): Path<String>, headers: HeaderMap) -> Response {
    dispatch(state, target, String::new(), headers).await
}

async fn serve(
    State(state): State<Arc<RouterState>>,
    Path((target, rest)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    dispatch(state, target, rest, headers).await
}

async fn dispatch(state: Arc<RouterState>, target: String, rest: String, headers: HeaderMap) -> Response {
    let Some(target_state) = state.targets.get(&target) else {
        return not_found(format!("no such target: {target}"));
    };

    let Some(route) = parse_rest(&rest) else {
        return not_found("no such page".to_string());
    };

    match route {
        Route::Index { year } => render_index(target_state, year).await,
        Route::Month { year, month, format } => {
            render_range(target_state, Ymd::month(year, month), format, &headers).await
        }
        Route::Day { year, month, day, format } => {
            render_range(target_state, Ymd::new(year, month, day), format, &headers).await
        }
        Route::Stalker { format } => render_stalker_snapshot(&state, &target, target_state, format).await,
    }
}

fn not_found(body: String) -> Response {
    (StatusCode::NOT_FOUND, body).into_response()
}

async fn render_index(target_state: &TargetState, year: Option<i32>) -> Response {
    let days = match year {
        Some(y) => target_state.index.for_year(y).await,
        None => target_state.index.all_days().await,
    };

    let formatter = Formatter::new(FormatKind::Html);
    let mut out = String::new();
    formatter.format_header(&mut out, None, None, None, &target_state.config.title);
    out.push_str("<ul class=\"log-index\">");
    for day in &days {
        out.push_str("<li><a href=\"");
        out.push_str(&format!("{:04}-{}-{}.html", day.year, day.month, day.day));
        out.push_str("\">");
        out.push_str(&format!("{:04}-{:02}-{:02}", day.year, day.month, day.day));
        out.push_str("</a></li>");
    }
    out.push_str("</ul>");
    formatter.format_footer(&mut out, None, None);

    (
        [("content-type", formatter.content_type())],
        out,
    )
        .into_response()
}

async fn render_stalker_snapshot(
    state: &RouterState,
    target: &str,
    target_state: &TargetState,
    format: FormatKind,
) -> Response {
    let formatter = Formatter::new(format);
    let year_link = target_state.index.default_year().await;
    let mut out = String::new();
    formatter.format_stalker_header(&mut out, Some(year_link), &target_state.config.title);
    state.stalker.format_snapshot(target, &formatter, &mut out).await;
    formatter.format_stalker_footer(&mut out);
    ([("content-type", formatter.content_type())], out).into_response()
}

fn imf_fixdate(unix_secs: i64) -> String {
    Utc.timestamp_opt(unix_secs, 0)
        .single()
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_default()
}

/// Parses `If-None-Match`'s comma-separated entity-tag list (each optionally
/// `W/`-prefixed) and checks for a strong match against `etag`.
fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get("if-none-match").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    value.split(',').map(str::trim).any(|tag| {
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag == etag
    })
}

fn if_modified_since_hits(headers: &HeaderMap, last_write_unix: i64) -> bool {
    let Some(value) = headers.get("if-modified-since").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Ok(cond) = chrono::DateTime::parse_from_rfc2822(value) else {
        return false;
    };
    last_write_unix <= cond.timestamp()
}

async fn render_range(
    target_state: &TargetState,
    date: Ymd,
    format: FormatKind,
    headers: &HeaderMap,
) -> Response {
    let Some((prev, next)) = target_state.index.lookup(date).await else {
        let what = if date.is_month_query() { "month" } else { "date" };
        return not_found(format!("no logs for {what}"));
    };

    let info = target_state.index.stat(date).await;
    let formatter = Formatter::new(format);

    if let Some(info) = &info {
        let etag = info.etag();
        if if_none_match_hits(headers, &etag) || if_modified_since_hits(headers, info.last_write_unix()) {
            return (
                StatusCode::NOT_MODIFIED,
                [
                    ("etag", etag),
                    ("last-modified", imf_fixdate(info.last_write_unix())),
                ],
            )
                .into_response();
        }
    }

    let days = if date.is_month_query() {
        target_state.index.days_in_month(date.year, date.month).await
    } else {
        vec![date]
    };
    let multiday = days.len() > 1;

    let mut out = String::new();
    formatter.format_header(&mut out, prev, next, Some(&format!("{}.html", date.year)), &target_state.config.title);

    let mut row_counter = 0u64;
    for day in &days {
        formatter.format_day(&mut out, multiday, *day);
        if let Ok(Some(reader)) = target_state.index.open(day.year, day.month, day.day).await {
            let mut reader = crate::codec::EventReader::new(reader);
            while let Ok(Some(event)) = reader.read() {
                formatter.format_event(&mut out, &event, &target_state.config, *day, RowId::Counter(row_counter));
                row_counter += 1;
            }
        }
    }
    formatter.format_footer(&mut out, prev, next);

    let mut response = ([("content-type", formatter.content_type().to_string())], out).into_response();
    if let Some(info) = &info {
        let headers_mut = response.headers_mut();
        if let Ok(v) = info.etag().parse() {
            headers_mut.insert("etag", v);
        }
        if let Ok(v) = imf_fixdate(info.last_write_unix()).parse() {
            headers_mut.insert("last-modified", v);
        }
    }
    response
}

async fn ws_handler(
    State(state): State<Arc<RouterState>>,
    Path(target): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.targets.contains_key(&target) {
        return not_found(format!("no such target: {target}"));
    }
    ws.protocols(["v1.stalker.logs.esolangs.org"])
        .on_upgrade(move |socket| handle_stalker_socket(state, target, socket))
}

async fn handle_stalker_socket(state: Arc<RouterState>, target: String, mut socket: WebSocket) {
    let (client_id, mut rx) = state.stalker.register_client(&target).await;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.len() != 8 {
                            let _ = socket
                                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                    code: 1002,
                                    reason: "protocol error".into(),
                                })))
                                .await;
                            break;
                        }
                        let day = i32::from_le_bytes(bytes[0..4].try_into().unwrap()) as i64;
                        let line = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as u64;
                        state.stalker.update_cursor(client_id, day, line).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        let _ = socket
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code: 1003,
                                reason: "invalid data".into(),
                            })))
                            .await;
                        break;
                    }
                    Some(Err(_)) => break,
                }
            }
            delivery = rx.recv() => {
                match delivery {
                    Some(delivery) => {
                        if socket.send(Message::Binary(delivery.header.to_vec().into())).await.is_err() {
                            break;
                        }
                        if socket.send(Message::Text(delivery.html.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.stalker.unregister_client(client_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stylesheet_serves_with_css_content_type() {
        let response = serve_stylesheet().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/css; charset=utf-8"
        );
    }

    #[test]
    fn parses_month_html() {
        assert_eq!(
            parse_rest("2024-01.html"),
            Some(Route::Month { year: 2024, month: 1, format: FormatKind::Html })
        );
    }

    #[test]
    fn parses_day_raw() {
        assert_eq!(
            parse_rest("2024-01-15-raw.txt"),
            Some(Route::Day { year: 2024, month: 1, day: 15, format: FormatKind::Raw })
        );
    }

    #[test]
    fn parses_year_index() {
        assert_eq!(parse_rest("2024.html"), Some(Route::Index { year: Some(2024) }));
    }

    #[test]
    fn parses_all_and_empty_as_index() {
        assert_eq!(parse_rest(""), Some(Route::Index { year: None }));
        assert_eq!(parse_rest("all.html"), Some(Route::Index { year: None }));
    }

    #[test]
    fn parses_stalker_variants() {
        assert_eq!(parse_rest("stalker.html"), Some(Route::Stalker { format: FormatKind::Html }));
        assert_eq!(parse_rest("stalker-raw.txt"), Some(Route::Stalker { format: FormatKind::Raw }));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_rest("whatever.png"), None);
    }

    #[test]
    fn if_none_match_strong_compares() {
        let mut headers = HeaderMap::new();
        headers.insert("if-none-match", "\"frozen\"".parse().unwrap());
        assert!(if_none_match_hits(&headers, "\"frozen\""));
        assert!(!if_none_match_hits(&headers, "\"15-200\""));
    }

    #[test]
    fn if_none_match_handles_weak_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("if-none-match", "W/\"15-200\", \"other\"".parse().unwrap());
        assert!(if_none_match_hits(&headers, "\"15-200\""));
    }
}

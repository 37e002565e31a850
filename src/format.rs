//! HTML / text / raw rendering of event sequences; nav & framing.
//!
//! One `Formatter` over a closed `FormatKind` enum rather than a trait per
//! output kind — each method matches on `self.kind` instead of dispatching
//! through a vtable, since the three kinds share almost all of their logic.

use std::fmt::Write as _;

use crate::model::{Direction, LogEvent, Ymd};

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub fn base62(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(BASE62[(n % 62) as usize]);
        n /= 62;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base62 alphabet is ASCII")
}

/// Simple polynomial nick hash (`h = 31*h + byte`) mod 10, selecting one of
/// 10 colour classes for a nick in HTML output.
pub fn nick_color_class(nick: &str) -> u8 {
    let mut h: u32 = 0;
    for b in nick.bytes() {
        h = h.wrapping_mul(31).wrapping_add(u32::from(b));
    }
    (h % 10) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Html,
    Text,
    Raw,
}

/// Per-target rendering context: self-nick for SENT events, and page title.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub name: String,
    pub nick: String,
    pub title: String,
    pub about: Option<String>,
    pub announce: Option<String>,
}

/// Where this row's anchor comes from: a monotonic counter for ordinary
/// range rendering, or a stalker delivery's `(day, line)` pair, which can't
/// use a single monotonic counter since lines from different days overlap.
#[derive(Debug, Clone, Copy)]
pub enum RowId {
    Counter(u64),
    Stalker { day: Ymd, line: u64 },
}

impl RowId {
    fn anchor_id(&self) -> String {
        match self {
            RowId::Counter(n) => format!("l{}", base62(*n)),
            RowId::Stalker { day, line } => {
                format!("s{}-{}-{}-{}", day.year, day.month, day.day, line)
            }
        }
    }

    /// For a counter row, a same-page fragment link. For a stalker delivery,
    /// a cross-day link into that day's own page, since a stalker page has
    /// no single stable id namespace spanning days.
    fn anchor_href(&self, day: Ymd) -> String {
        match self {
            RowId::Counter(n) => format!("#l{}", base62(*n)),
            RowId::Stalker { line, .. } => {
                format!("{:04}-{}-{}.html#l{}", day.year, day.month, day.day, base62(*line))
            }
        }
    }
}

pub struct Formatter {
    pub kind: FormatKind,
}

impl Formatter {
    pub fn new(kind: FormatKind) -> Self {
        Self { kind }
    }

    pub fn content_type(&self) -> &'static str {
        match self.kind {
            FormatKind::Html => "text/html; charset=utf-8",
            FormatKind::Text | FormatKind::Raw => "text/plain; charset=utf-8",
        }
    }

    pub fn format_header(&self, out: &mut String, prev: Option<Ymd>, next: Option<Ymd>, year_link: Option<&str>, title: &str) {
        if self.kind != FormatKind::Html {
            return;
        }
        out.push_str("<!DOCTYPE html>\n<html><head>");
        let _ = write!(out, "<title>{}</title>", escape_html(title));
        out.push_str(r#"<link rel="stylesheet" href="/log.css"></head><body>"#);
        out.push_str(r#"<nav class="logs-nav">"#);
        push_nav_link(out, prev.map(day_href), "\u{2190}prev");
        let _ = write!(out, "<span class=\"title\">{}</span>", escape_html(title));
        push_nav_link(out, next.map(day_href), "next\u{2192}");
        if let Some(year) = year_link {
            push_nav_link(out, Some(year.to_string()), "\u{2191}year");
        }
        push_nav_link(out, Some("all.html".to_string()), "\u{2191}all");
        out.push_str("</nav>\n");
    }

    pub fn format_footer(&self, out: &mut String, prev: Option<Ymd>, next: Option<Ymd>) {
        if self.kind != FormatKind::Html {
            return;
        }
        out.push_str(r#"<nav class="logs-nav logs-nav-footer">"#);
        push_nav_link(out, prev.map(day_href), "\u{2190}prev");
        push_nav_link(out, next.map(day_href), "next\u{2192}");
        out.push_str("</nav></body></html>\n");
    }

    pub fn format_stalker_header(&self, out: &mut String, year_link: Option<i32>, title: &str) {
        if self.kind != FormatKind::Html {
            return;
        }
        out.push_str("<!DOCTYPE html>\n<html><head>");
        let _ = write!(out, "<title>{} (live)</title>", escape_html(title));
        out.push_str(r#"<link rel="stylesheet" href="/log.css"></head><body>"#);
        out.push_str(r#"<nav class="logs-nav">"#);
        let _ = write!(out, "<span class=\"title\">{}</span>", escape_html(title));
        if let Some(year) = year_link {
            push_nav_link(out, Some(format!("{year}.html")), "\u{2191}year");
        }
        push_nav_link(out, Some("all.html".to_string()), "\u{2191}all");
        out.push_str("</nav>\n");
        out.push_str(r#"<div class="stalker-log">"#);
    }

    pub fn format_stalker_footer(&self, out: &mut String) {
        if self.kind != FormatKind::Html {
            return;
        }
        out.push_str("</div></body></html>\n");
    }

    /// Rendered when the same page spans multiple days: a sub-header
    /// announcing the day, emitted once per day boundary (not for a
    /// single-day page).
    pub fn format_day(&self, out: &mut String, multiday: bool, day: Ymd) {
        if !multiday {
            return;
        }
        match self.kind {
            FormatKind::Html => {
                let _ = write!(
                    out,
                    r#"<h2 id="d{y}-{m}-{d}">{y:04}-{m:02}-{d:02}</h2>"#,
                    y = day.year,
                    m = day.month,
                    d = day.day
                );
            }
            FormatKind::Text | FormatKind::Raw => {
                let _ = writeln!(out, "=== {:04}-{:02}-{:02} ===", day.year, day.month, day.day);
            }
        }
    }

    /// Emitted between day blocks in stalker rendering when the first
    /// visible event on a day isn't that day's first event.
    pub fn format_elision(&self, out: &mut String) {
        match self.kind {
            FormatKind::Html => out.push_str(r#"<p class="elision">&hellip;</p>"#),
            FormatKind::Text | FormatKind::Raw => out.push_str("...\n"),
        }
    }

    pub fn format_event(&self, out: &mut String, event: &LogEvent, target: &TargetConfig, day: Ymd, row: RowId) {
        match self.kind {
            FormatKind::Raw => format_event_raw(out, event, day),
            FormatKind::Text => format_event_text(out, event, target),
            FormatKind::Html => format_event_html(out, event, target, day, row),
        }
    }
}

fn day_href(d: Ymd) -> String {
    format!("{:04}-{}-{}.html", d.year, d.month, d.day)
}

fn push_nav_link(out: &mut String, href: Option<String>, label: &str) {
    match href {
        Some(href) => {
            let _ = write!(out, r#"<a href="{}">{}</a>"#, escape_html(&href), label);
        }
        None => {
            let _ = write!(out, r#"<span class="disabled">{label}</span>"#);
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// `\x01` outside of an `ACTION` frame, and other control characters below
/// 32, are stripped (or rendered literally for `\x01`) before plain-text
/// display.
fn strip_controls(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c as u32 {
            1 => out.push_str("<CTCP>"),
            n if n < 32 => {}
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable classification of an event's command, driving both text
/// and HTML body rendering. `NICK`/`QUIT` take their body from arg 0;
/// everything else takes it from args[1..] joined by spaces (arg 0 is the
/// channel).
enum Rendered {
    Message { body: String, action: bool },
    Joined,
    Left { reason: Option<String> },
    Quit { reason: Option<String> },
    NickChange { new_nick: String },
    Kicked { victim: String, reason: Option<String> },
    ModeSet { params: String },
    TopicSet { params: String },
    Dropped,
    Unexpected,
}

fn joined_from(event: &LogEvent, from: usize) -> Option<String> {
    let joined = event.args.get(from..)?.join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn classify(event: &LogEvent) -> Rendered {
    match event.command.as_str() {
        "PRIVMSG" | "NOTICE" => {
            let body = joined_from(event, 1).unwrap_or_default();
            if let Some(action) = body
                .strip_prefix('\u{1}')
                .and_then(|s| s.strip_suffix('\u{1}'))
                .and_then(|s| s.strip_prefix("ACTION "))
            {
                Rendered::Message {
                    body: action.to_string(),
                    action: true,
                }
            } else {
                Rendered::Message { body, action: false }
            }
        }
        "JOIN" => Rendered::Joined,
        "PART" => Rendered::Left {
            reason: joined_from(event, 1),
        },
        "QUIT" => Rendered::Quit {
            reason: event.args.first().cloned(),
        },
        "NICK" => Rendered::NickChange {
            new_nick: event.args.first().cloned().unwrap_or_default(),
        },
        "KICK" => Rendered::Kicked {
            victim: event.args.get(1).cloned().unwrap_or_default(),
            reason: joined_from(event, 2),
        },
        "MODE" => Rendered::ModeSet {
            params: joined_from(event, 1).unwrap_or_default(),
        },
        "TOPIC" => Rendered::TopicSet {
            params: joined_from(event, 1).unwrap_or_default(),
        },
        "NAMES" => Rendered::Dropped,
        _ => Rendered::Unexpected,
    }
}

fn event_nick<'a>(event: &'a LogEvent, target: &'a TargetConfig) -> Option<&'a str> {
    if event.direction == Direction::Sent {
        Some(target.nick.as_str())
    } else {
        event.prefix_nick()
    }
}

fn format_hms(time_us: u64) -> String {
    let secs = time_us / 1_000_000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn format_event_text(out: &mut String, event: &LogEvent, target: &TargetConfig) {
    let nick = event_nick(event, target).unwrap_or("*");
    let time = format_hms(event.time_us);
    match classify(event) {
        Rendered::Message { body, action } => {
            let body = strip_controls(&body);
            if action {
                let _ = writeln!(out, "{time} * {nick} {body}");
            } else {
                let _ = writeln!(out, "{time} <{nick}> {body}");
            }
        }
        Rendered::Joined => {
            let _ = writeln!(out, "{time} {nick} joined");
        }
        Rendered::Left { reason } => {
            let _ = writeln!(out, "{time} {nick} left{}", text_suffix(reason));
        }
        Rendered::Quit { reason } => {
            let _ = writeln!(out, "{time} {nick} quit{}", text_suffix(reason));
        }
        Rendered::NickChange { new_nick } => {
            let _ = writeln!(out, "{time} {nick} changed nick to {new_nick}");
        }
        Rendered::Kicked { victim, reason } => {
            let _ = writeln!(out, "{time} {nick} kicked {victim}{}", text_suffix(reason));
        }
        Rendered::ModeSet { params } => {
            let _ = writeln!(out, "{time} {nick} set channel mode {params}");
        }
        Rendered::TopicSet { params } => {
            let _ = writeln!(out, "{time} {nick} set topic {params}");
        }
        Rendered::Dropped => {}
        Rendered::Unexpected => {
            let _ = writeln!(out, "{time} unexpected log event :(");
        }
    }
}

fn text_suffix(reason: Option<String>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!(" ({})", strip_controls(&r)),
        _ => String::new(),
    }
}

fn format_event_raw(out: &mut String, event: &LogEvent, day: Ymd) {
    let dir = match event.direction {
        Direction::Received => '<',
        Direction::Sent => '>',
    };
    let day_start_secs = day.day_number() * 86_400;
    let unix_secs = day_start_secs + (event.time_us / 1_000_000) as i64;
    let micros = event.time_us % 1_000_000;

    let _ = write!(out, "{dir} {unix_secs} {micros}");
    if let Some(prefix) = &event.prefix {
        let _ = write!(out, " :{prefix}");
    }
    let _ = write!(out, " {}", event.command);
    if let Some((last, rest)) = event.args.split_last() {
        for arg in rest {
            let _ = write!(out, " {arg}");
        }
        let _ = write!(out, " :{last}");
    }
    out.push('\n');
}

/// Current text style during HTML body rendering.
#[derive(Default, Clone, PartialEq, Eq)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    fg: Option<String>,
    bg: Option<String>,
}

impl Style {
    fn is_default(&self) -> bool {
        *self == Style::default()
    }

    fn css_classes(&self) -> Vec<String> {
        let mut classes = Vec::new();
        if self.bold {
            classes.push("irc-b".to_string());
        }
        if self.italic {
            classes.push("irc-i".to_string());
        }
        if self.underline {
            classes.push("irc-u".to_string());
        }
        if self.strike {
            classes.push("irc-s".to_string());
        }
        if let Some(fg) = &self.fg {
            classes.push(format!("irc-fg-{fg}"));
        }
        if let Some(bg) = &self.bg {
            classes.push(format!("irc-bg-{bg}"));
        }
        classes
    }
}

/// HTML body rendering with the mIRC-style control-code state machine:
/// bold (`\x02`), italic (`\x1D`), underline (`\x1F`), strikethrough
/// (`\x1E`), colour (`\x03` + 1-2 digit fg, optional `,` + 1-2 digit bg),
/// reset (`\x0F`). `\x01` renders as the literal text `<CTCP>`.
///
/// Every toggle closes any currently-open `<span>` and opens a fresh one
/// with the new class set, rather than tracking nested tags individually —
/// simpler, and the control codes don't nest in practice.
fn render_html_body(body: &str) -> String {
    let mut out = String::new();
    let mut style = Style::default();
    let mut span_open = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c as u32 {
            1 => out.push_str("&lt;CTCP&gt;"),
            2 => {
                style.bold = !style.bold;
                retag(&mut out, &mut span_open, &style);
            }
            3 => {
                let fg = take_digits(&mut chars, 2);
                let mut bg = None;
                if chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let candidate = take_digits(&mut lookahead, 2);
                    if candidate.is_some() {
                        chars = lookahead;
                        bg = candidate;
                    }
                }
                style.fg = fg;
                style.bg = bg;
                retag(&mut out, &mut span_open, &style);
            }
            15 => {
                style = Style::default();
                if span_open {
                    out.push_str("</span>");
                    span_open = false;
                }
            }
            29 => {
                style.italic = !style.italic;
                retag(&mut out, &mut span_open, &style);
            }
            30 => {
                style.strike = !style.strike;
                retag(&mut out, &mut span_open, &style);
            }
            31 => {
                style.underline = !style.underline;
                retag(&mut out, &mut span_open, &style);
            }
            n if n < 32 => {}
            _ => match c {
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '&' => out.push_str("&amp;"),
                other => out.push(other),
            },
        }
    }
    if span_open {
        out.push_str("</span>");
    }
    out
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) -> Option<String> {
    let mut digits = String::new();
    while digits.len() < max && chars.peek().is_some_and(char::is_ascii_digit) {
        digits.push(chars.next().unwrap());
    }
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

fn retag(out: &mut String, span_open: &mut bool, style: &Style) {
    if *span_open {
        out.push_str("</span>");
        *span_open = false;
    }
    if !style.is_default() {
        let _ = write!(out, r#"<span class="{}">"#, style.css_classes().join(" "));
        *span_open = true;
    }
}

fn html_suffix(reason: Option<String>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!(" ({})", escape_html(&r)),
        _ => String::new(),
    }
}

fn format_event_html(out: &mut String, event: &LogEvent, target: &TargetConfig, day: Ymd, row: RowId) {
    let nick = event_nick(event, target).unwrap_or("*").to_string();
    let color_class = nick_color_class(&nick);
    let time = format_hms(event.time_us);
    let anchor_id = row.anchor_id();
    let anchor_href = row.anchor_href(day);
    let nick_html = escape_html(&nick);

    if matches!(classify(event), Rendered::Dropped) {
        return;
    }

    let _ = write!(
        out,
        r#"<div class="r" id="{anchor_id}"><a class="t" href="{anchor_href}">{time}</a> "#
    );

    match classify(event) {
        Rendered::Message { body, action } => {
            if action {
                let _ = write!(
                    out,
                    r#"<span class="action nick-{color_class}">* {nick_html}</span> {}"#,
                    render_html_body(&body)
                );
            } else {
                let _ = write!(
                    out,
                    r#"<span class="nick nick-{color_class}">&lt;{nick_html}&gt;</span> {}"#,
                    render_html_body(&body)
                );
            }
        }
        Rendered::Joined => {
            let _ = write!(out, r#"<span class="nick nick-{color_class}">{nick_html}</span> joined"#);
        }
        Rendered::Left { reason } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> left{}"#,
                html_suffix(reason)
            );
        }
        Rendered::Quit { reason } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> quit{}"#,
                html_suffix(reason)
            );
        }
        Rendered::NickChange { new_nick } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> changed nick to {}"#,
                escape_html(&new_nick)
            );
        }
        Rendered::Kicked { victim, reason } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> kicked {}{}"#,
                escape_html(&victim),
                html_suffix(reason)
            );
        }
        Rendered::ModeSet { params } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> set channel mode {}"#,
                escape_html(&params)
            );
        }
        Rendered::TopicSet { params } => {
            let _ = write!(
                out,
                r#"<span class="nick nick-{color_class}">{nick_html}</span> set topic {}"#,
                escape_html(&params)
            );
        }
        Rendered::Dropped => unreachable!("handled above"),
        Rendered::Unexpected => {
            out.push_str("unexpected log event :(");
        }
    }
    out.push_str("</div>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogEvent;

    fn target() -> TargetConfig {
        TargetConfig {
            name: "t".to_string(),
            nick: "bot".to_string(),
            title: "Test Channel".to_string(),
            about: None,
            announce: None,
        }
    }

    #[test]
    fn base62_round_trips_small_values() {
        assert_eq!(base62(0), "0");
        assert_eq!(base62(61), "z");
        assert_eq!(base62(62), "10");
    }

    #[test]
    fn nick_hash_is_stable() {
        assert_eq!(nick_color_class("alice"), nick_color_class("alice"));
    }

    #[test]
    fn stalker_header_includes_year_link_when_given() {
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_stalker_header(&mut out, Some(2024), "Test Channel");
        assert!(out.contains(r#"href="2024.html""#));
        assert!(out.contains("\u{2191}year"));
    }

    #[test]
    fn stalker_header_omits_year_link_when_absent() {
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_stalker_header(&mut out, None, "Test Channel");
        assert!(!out.contains("\u{2191}year"));
    }

    #[test]
    fn text_privmsg_renders_angle_bracket_nick() {
        let mut e = LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "hi".into()]);
        e.time_us = 43_200_000_000;
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "12:00:00 <alice> hi\n");
    }

    #[test]
    fn raw_privmsg_matches_scenario_1() {
        let mut e = LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "hi".into()]);
        e.time_us = 43_200_250_000;
        let f = Formatter::new(FormatKind::Raw);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "< 1705320000 250000 :alice!u@h PRIVMSG #c :hi\n");
    }

    #[test]
    fn names_is_silently_dropped_in_text() {
        let e = LogEvent::new(Some("alice!u@h".into()), "NAMES", vec!["#c".into()]);
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "");
    }

    #[test]
    fn names_is_silently_dropped_in_html() {
        let e = LogEvent::new(Some("alice!u@h".into()), "NAMES", vec!["#c".into()]);
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "");
    }

    #[test]
    fn html_escapes_angle_brackets_in_body() {
        let mut e = LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "<b>hey</b>".into()]);
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert!(out.contains("&lt;b&gt;hey&lt;/b&gt;"));
        assert!(!out.contains("<b>hey"));
    }

    #[test]
    fn html_bold_control_code_wraps_span() {
        let mut e = LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "\u{2}bold\u{2}".into()]);
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert!(out.contains(r#"class="irc-b""#));
    }

    #[test]
    fn html_color_code_parses_fg_and_bg() {
        let mut e = LogEvent::new(
            Some("alice!u@h".into()),
            "PRIVMSG",
            vec!["#c".into(), "\u{3}4,8red\u{f}plain".into()],
        );
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Html);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert!(out.contains("irc-fg-4"));
        assert!(out.contains("irc-bg-8"));
        assert!(out.contains("plain"));
    }

    #[test]
    fn ctcp_marker_outside_action_renders_literally() {
        let mut e = LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "\u{1}VERSION\u{1}".into()]);
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "00:00:00 <alice> <CTCP>VERSION<CTCP>\n");
    }

    #[test]
    fn action_message_is_classified_and_rendered() {
        let mut e = LogEvent::new(
            Some("alice!u@h".into()),
            "PRIVMSG",
            vec!["#c".into(), "\u{1}ACTION waves\u{1}".into()],
        );
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "00:00:00 * alice waves\n");
    }

    #[test]
    fn sent_event_uses_configured_nick() {
        let mut e = LogEvent::new(None, "PRIVMSG", vec!["#c".into(), "hi".into()]).sent();
        e.time_us = 0;
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "00:00:00 <bot> hi\n");
    }

    #[test]
    fn kick_renders_victim_and_reason() {
        let e = LogEvent::new(
            Some("alice!u@h".into()),
            "KICK",
            vec!["#c".into(), "bob".into(), "spamming".into()],
        );
        let f = Formatter::new(FormatKind::Text);
        let mut out = String::new();
        f.format_event(&mut out, &e, &target(), Ymd::new(2024, 1, 15), RowId::Counter(0));
        assert_eq!(out, "00:00:00 alice kicked bob (spamming)\n");
    }
}

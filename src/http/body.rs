//! Streaming rewrite of upstream response bodies.
//!
//! # Responsibilities
//! - Decide per response whether the body is rewritable text
//! - Decode UTF-8 incrementally, carrying split multi-byte sequences
//! - Replace the upstream base URL with the public domain, including
//!   occurrences split across chunks
//! - Pass every other body through byte-exact
//!
//! # Design Decisions
//! - Literal substring replacement, no HTML/JSON awareness
//! - Only a tail that could start the base URL is held back, so streamed
//!   responses keep flowing chunk by chunk
//! - Output length differs from input; callers must drop Content-Length

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

/// Whether a response with these headers carries rewritable text.
pub fn is_rewritable(headers: &HeaderMap) -> bool {
    let encoded = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);
    if encoded {
        return false;
    }

    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .map(|v| v.starts_with("text/") || v.contains("json"))
        .unwrap_or(false)
}

/// Incremental UTF-8 decoder plus literal replacement.
#[derive(Debug)]
pub struct TextRewriter {
    needle: String,
    replacement: String,
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk.
    undecoded: Vec<u8>,
    /// Decoded tail that may be the start of `needle`.
    held: String,
}

impl TextRewriter {
    pub fn new(needle: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            replacement: replacement.into(),
            undecoded: Vec::new(),
            held: String::new(),
        }
    }

    /// Feed one chunk, returning the rewritten bytes that are ready.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        let mut text = std::mem::take(&mut self.held);
        self.decode_into(chunk, &mut text);

        let split = text.len() - self.held_tail_len(&text);
        self.held = text.split_off(split);

        self.replace(text)
    }

    /// Flush everything held back at end of stream.
    pub fn finish(&mut self) -> Bytes {
        let mut text = std::mem::take(&mut self.held);
        if !self.undecoded.is_empty() {
            self.undecoded.clear();
            text.push(char::REPLACEMENT_CHARACTER);
        }
        self.replace(text)
    }

    fn replace(&self, text: String) -> Bytes {
        if self.needle.is_empty() || !text.contains(&self.needle) {
            Bytes::from(text)
        } else {
            Bytes::from(text.replace(&self.needle, &self.replacement))
        }
    }

    fn decode_into(&mut self, chunk: &[u8], out: &mut String) {
        let joined;
        let mut input: &[u8] = if self.undecoded.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.undecoded);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            self.undecoded = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Length of the longest suffix of `text` that is a proper prefix of the
    /// needle and starts after the last complete occurrence.
    fn held_tail_len(&self, text: &str) -> usize {
        let floor = text
            .rfind(&self.needle)
            .map(|i| i + self.needle.len())
            .unwrap_or(0);

        self.needle
            .char_indices()
            .map(|(i, _)| i)
            .filter(|&i| i > 0)
            .rev()
            .find(|&len| {
                len <= text.len() - floor && text.ends_with(&self.needle[..len])
            })
            .unwrap_or(0)
    }
}

/// Body adapter running every data frame through a [`TextRewriter`].
pub struct RewriteBody<B> {
    inner: B,
    rewriter: TextRewriter,
    trailers: Option<Frame<Bytes>>,
    done: bool,
}

impl<B> RewriteBody<B> {
    pub fn new(inner: B, rewriter: TextRewriter) -> Self {
        Self {
            inner,
            rewriter,
            trailers: None,
            done: false,
        }
    }
}

impl<B> Body for RewriteBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        loop {
            if this.done {
                return Poll::Ready(this.trailers.take().map(Ok));
            }

            match Pin::new(&mut this.inner).poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        let out = this.rewriter.push(&data);
                        if !out.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(out))));
                        }
                    }
                    Err(trailers) => {
                        this.done = true;
                        this.trailers = Some(trailers);
                        let tail = this.rewriter.finish();
                        if !tail.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(tail))));
                        }
                    }
                },
                Poll::Ready(None) => {
                    this.done = true;
                    let tail = this.rewriter.finish();
                    if !tail.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(tail))));
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

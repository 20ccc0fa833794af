//! Newline-delimited JSON decoding for streamed query responses

use anyhow::{Context, Result};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

/// Turn a stream of byte chunks into a stream of JSON values, one per line
///
/// Lines may be split across chunks. Blank lines are skipped and an SSE style
/// `data:` prefix is tolerated. A trailing line without a newline is still
/// decoded when the byte stream ends.
pub fn decode_lines<S, B, E>(bytes: S) -> BoxStream<'static, Result<Value>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let state = (bytes.boxed(), Vec::<u8>::new(), false);

    futures::stream::unfold(state, |(mut bytes, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                match parse_line(&line) {
                    Some(item) => return Some((item, (bytes, buf, done))),
                    None => continue,
                }
            }

            if done {
                let rest = std::mem::take(&mut buf);
                return parse_line(&rest).map(|item| (item, (bytes, buf, done)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    done = true;
                    buf.clear();
                    return Some((Err(e.into()), (bytes, buf, done)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}

fn parse_line(raw: &[u8]) -> Option<Result<Value>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    let line = line.strip_prefix("data:").unwrap_or(line).trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).context("Failed to parse stream chunk"))
}

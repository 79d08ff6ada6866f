use crate::{error::*, log::*};
use brotli::Decompressor;
use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use http::{header, HeaderMap, HeaderValue};
use std::io::{Cursor, Read};

/// Decode a buffered upstream body according to its Content-Encoding chain so
/// the rewriter and the challenge sniffer can operate on plain text. Strips
/// the encoding headers and fixes Content-Length on success. Returns the body
/// unchanged when no (supported) encoding applies.
pub(crate) fn ensure_plain_body(headers: &mut HeaderMap, body: Bytes) -> PrevuResult<Bytes> {
  let Some(raw) = headers.get(header::CONTENT_ENCODING) else {
    return Ok(body);
  };
  let encodings: Vec<String> = raw
    .to_str()
    .unwrap_or_default()
    .split(',')
    .map(|token| token.trim().to_ascii_lowercase())
    .filter(|token| !token.is_empty() && token != "identity")
    .collect();

  if encodings.is_empty() {
    headers.remove(header::CONTENT_ENCODING);
    return Ok(body);
  }

  let mut decoded = body.to_vec();
  for encoding in encodings.into_iter().rev() {
    decoded = match encoding.as_str() {
      "gzip" | "x-gzip" => decode_gzip(&decoded)?,
      "deflate" => decode_deflate(&decoded)?,
      "br" => decode_brotli(&decoded)?,
      other => {
        debug!("unsupported content-encoding, passing body through: {other}");
        return Ok(body);
      }
    };
  }

  headers.remove(header::CONTENT_ENCODING);
  headers.remove(header::TRANSFER_ENCODING);
  let len_value = HeaderValue::from_str(&decoded.len().to_string())
    .map_err(|e| PrevuError::HyperBodyManipulationError(e.to_string()))?;
  headers.insert(header::CONTENT_LENGTH, len_value);
  Ok(Bytes::from(decoded))
}

fn decode_gzip(data: &[u8]) -> PrevuResult<Vec<u8>> {
  let mut decoder = GzDecoder::new(data);
  let mut out = Vec::new();
  decoder.read_to_end(&mut out)?;
  Ok(out)
}

fn decode_deflate(data: &[u8]) -> PrevuResult<Vec<u8>> {
  let mut decoder = ZlibDecoder::new(data);
  let mut out = Vec::new();
  decoder.read_to_end(&mut out)?;
  Ok(out)
}

fn decode_brotli(data: &[u8]) -> PrevuResult<Vec<u8>> {
  let cursor = Cursor::new(data);
  let mut decoder = Decompressor::new(cursor, 4096);
  let mut out = Vec::new();
  decoder.read_to_end(&mut out)?;
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use flate2::{write::GzEncoder, Compression};
  use std::io::Write;

  #[test]
  fn gzip_bodies_are_decoded_and_headers_fixed() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"<html>hello</html>").unwrap();
    let compressed = encoder.finish().unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

    let plain = ensure_plain_body(&mut headers, Bytes::from(compressed)).unwrap();
    assert_eq!(plain.as_ref(), b"<html>hello</html>");
    assert!(headers.get(header::CONTENT_ENCODING).is_none());
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "18");
  }

  #[test]
  fn unencoded_bodies_pass_through() {
    let mut headers = HeaderMap::new();
    let body = Bytes::from_static(b"plain");
    let out = ensure_plain_body(&mut headers, body.clone()).unwrap();
    assert_eq!(out, body);
  }

  #[test]
  fn unknown_encoding_is_left_alone() {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("zstd"));
    let body = Bytes::from_static(b"opaque");
    let out = ensure_plain_body(&mut headers, body.clone()).unwrap();
    assert_eq!(out, body);
    assert!(headers.get(header::CONTENT_ENCODING).is_some());
  }
}

//! Format conversion and compression pipeline for outgoing downloads.
//!
//! A [`TransferPlan`] captures what has to happen between the stored bytes
//! and the wire: an optional row-wise format transform (CSV to JSON or
//! JSONL) followed by optional compression. Raw passthrough streams the
//! backend bytes untouched; gzip compresses incrementally; zip requires the
//! whole output in memory and is therefore capped by the transform ceiling.

use bytes::Bytes;
use datashare_core::models::format::{classify, Compression, DatasetFormat, Resumability};
use datashare_core::AppError;
use flate2::write::GzEncoder;
use flate2::Compression as GzipLevel;
use futures::{Stream, StreamExt};
use std::io::Write;
use std::pin::Pin;

use crate::AppResult;

/// Chunked byte stream flowing toward the client.
pub type DataStream = Pin<Box<dyn Stream<Item = Result<Bytes, AppError>> + Send>>;

/// Lift a backend read stream into the service error domain.
pub fn from_storage(stream: datashare_storage::ByteStream) -> DataStream {
    Box::pin(stream.map(|chunk| chunk.map_err(AppError::from)))
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub stored_format: DatasetFormat,
    pub requested_format: DatasetFormat,
    pub compression: Compression,
    pub resumability: Resumability,
}

impl TransferPlan {
    /// Build a plan, rejecting conversions the pipeline does not implement.
    /// Identity is always allowed; the only cross-format transforms are
    /// CSV to JSON and CSV to JSONL.
    pub fn new(
        stored_format: DatasetFormat,
        requested_format: DatasetFormat,
        compression: Compression,
    ) -> AppResult<Self> {
        let identity = stored_format == requested_format;
        let supported = identity
            || matches!(
                (stored_format, requested_format),
                (DatasetFormat::Csv, DatasetFormat::Json)
                    | (DatasetFormat::Csv, DatasetFormat::Jsonl)
            );
        if !supported {
            return Err(AppError::InvalidInput(format!(
                "Conversion from {} to {} is not supported",
                stored_format, requested_format
            )));
        }

        Ok(TransferPlan {
            stored_format,
            requested_format,
            compression,
            resumability: classify(identity, compression),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.stored_format == self.requested_format
    }

    /// Whether the whole output must sit in memory before the first byte
    /// can be sent (zip central directory comes last but offsets are fixed
    /// up front, so we materialize).
    pub fn requires_materialization(&self) -> bool {
        self.compression == Compression::Zip
    }

    pub fn content_type(&self) -> &'static str {
        self.compression
            .content_type()
            .unwrap_or_else(|| self.requested_format.content_type())
    }

    /// Download filename: stem, format extension, compression extension.
    pub fn filename(&self, stem: &str) -> String {
        let base = format!("{}.{}", stem, self.requested_format.extension());
        match self.compression.extension() {
            Some(ext) => format!("{}.{}", base, ext),
            None => base,
        }
    }

    /// Exact output size when it is knowable in advance. Only raw
    /// passthrough has one; every synthesized stream is open-ended.
    pub fn output_size(&self, source_size: u64) -> Option<u64> {
        if self.is_identity() && self.compression == Compression::None {
            Some(source_size)
        } else {
            None
        }
    }

    /// Assemble the stream pipeline. `ceiling` bounds materialized (zip)
    /// output; `inner_name` is the entry name inside a zip archive.
    pub fn apply(&self, source: DataStream, ceiling: u64, inner_name: &str) -> DataStream {
        let transformed = if self.is_identity() {
            source
        } else {
            match self.requested_format {
                DatasetFormat::Jsonl => csv_to_jsonl(source),
                DatasetFormat::Json => csv_to_json_array(source),
                // `new` rejects everything else
                DatasetFormat::Csv => source,
            }
        };

        match self.compression {
            Compression::None => transformed,
            Compression::Gzip => gzip(transformed),
            Compression::Zip => zip_single(transformed, ceiling, inner_name.to_string()),
        }
    }
}

/// Skip the first `n` bytes of a stream. Used to resume a synthesized
/// stream that cannot be seeked at the backend.
pub fn discard_prefix(source: DataStream, n: u64) -> DataStream {
    let state = (source, n);
    Box::pin(futures::stream::try_unfold(
        state,
        |(mut src, mut remaining)| async move {
            loop {
                match src.next().await {
                    Some(Ok(chunk)) => {
                        if remaining == 0 {
                            return Ok(Some((chunk, (src, 0))));
                        }
                        let len = chunk.len() as u64;
                        if len <= remaining {
                            remaining -= len;
                            continue;
                        }
                        let kept = chunk.slice(remaining as usize..);
                        return Ok(Some((kept, (src, 0))));
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(None),
                }
            }
        },
    ))
}

type LineStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

/// Split a byte stream into lines, tolerating CRLF and a missing trailing
/// newline.
fn lines(source: DataStream) -> LineStream {
    struct State {
        src: DataStream,
        buf: Vec<u8>,
        done: bool,
    }

    let state = State {
        src: source,
        buf: Vec::new(),
        done: false,
    };

    Box::pin(futures::stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = st.buf.drain(..=pos).collect();
                let mut line = String::from_utf8_lossy(&raw).into_owned();
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                return Ok(Some((line, st)));
            }
            if st.done {
                if st.buf.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&st.buf).into_owned();
                st.buf.clear();
                return Ok(Some((line, st)));
            }
            match st.src.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => st.done = true,
            }
        }
    }))
}

/// Parse one CSV line: comma-separated, double quotes for embedded commas,
/// `""` as an escaped quote inside a quoted field.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn record_to_json(header: &[String], fields: &[String]) -> serde_json::Value {
    let mut obj = serde_json::Map::with_capacity(header.len());
    for (i, name) in header.iter().enumerate() {
        obj.insert(
            name.clone(),
            serde_json::Value::String(fields.get(i).cloned().unwrap_or_default()),
        );
    }
    serde_json::Value::Object(obj)
}

/// CSV source to JSON Lines: first row is the header, each subsequent row
/// becomes one JSON object per line. Values stay strings; the pipeline does
/// not guess at types.
fn csv_to_jsonl(source: DataStream) -> DataStream {
    struct State {
        lines: LineStream,
        header: Option<Vec<String>>,
    }

    let state = State {
        lines: lines(source),
        header: None,
    };

    Box::pin(futures::stream::try_unfold(state, |mut st| async move {
        loop {
            match st.lines.next().await {
                Some(Ok(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    let fields = parse_csv_line(&line);
                    match &st.header {
                        None => st.header = Some(fields),
                        Some(header) => {
                            let mut out = serde_json::to_vec(&record_to_json(header, &fields))?;
                            out.push(b'\n');
                            return Ok(Some((Bytes::from(out), st)));
                        }
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }))
}

/// CSV source to a single JSON array of objects, emitted incrementally.
fn csv_to_json_array(source: DataStream) -> DataStream {
    struct State {
        lines: LineStream,
        header: Option<Vec<String>>,
        emitted_any: bool,
        closed: bool,
    }

    let state = State {
        lines: lines(source),
        header: None,
        emitted_any: false,
        closed: false,
    };

    Box::pin(futures::stream::try_unfold(state, |mut st| async move {
        loop {
            if st.closed {
                return Ok(None);
            }
            match st.lines.next().await {
                Some(Ok(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    let fields = parse_csv_line(&line);
                    match &st.header {
                        None => st.header = Some(fields),
                        Some(header) => {
                            let record = serde_json::to_vec(&record_to_json(header, &fields))?;
                            let mut out =
                                Vec::from(if st.emitted_any { &b",\n"[..] } else { &b"[\n"[..] });
                            out.extend_from_slice(&record);
                            st.emitted_any = true;
                            return Ok(Some((Bytes::from(out), st)));
                        }
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    st.closed = true;
                    let tail = if st.emitted_any { &b"\n]\n"[..] } else { &b"[]\n"[..] };
                    return Ok(Some((Bytes::from_static(tail), st)));
                }
            }
        }
    }))
}

/// Incremental gzip: chunks are compressed as they arrive and flushed when
/// the encoder has produced output, with the trailer written at end of
/// stream.
fn gzip(source: DataStream) -> DataStream {
    struct State {
        src: DataStream,
        encoder: Option<GzEncoder<Vec<u8>>>,
    }

    let state = State {
        src: source,
        encoder: Some(GzEncoder::new(Vec::new(), GzipLevel::default())),
    };

    Box::pin(futures::stream::try_unfold(state, |mut st| async move {
        loop {
            let encoder = match st.encoder.as_mut() {
                Some(enc) => enc,
                None => return Ok(None),
            };
            match st.src.next().await {
                Some(Ok(chunk)) => {
                    encoder.write_all(&chunk)?;
                    let out = std::mem::take(encoder.get_mut());
                    if !out.is_empty() {
                        return Ok(Some((Bytes::from(out), st)));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    // only reachable with Some(encoder)
                    let enc = match st.encoder.take() {
                        Some(enc) => enc,
                        None => return Ok(None),
                    };
                    let out = enc.finish()?;
                    return Ok(Some((Bytes::from(out), st)));
                }
            }
        }
    }))
}

/// Materialize the stream into a single-entry zip archive, failing with
/// `TransformTooLarge` as soon as the input outgrows the ceiling.
fn zip_single(source: DataStream, ceiling: u64, inner_name: String) -> DataStream {
    Box::pin(futures::stream::once(async move {
        let mut src = source;
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = src.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > ceiling {
                return Err(AppError::TransformTooLarge {
                    size: (body.len() + chunk.len()) as u64,
                    ceiling,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let cursor = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(cursor);
        writer
            .start_file(inner_name, zip::write::FileOptions::default())
            .map_err(|e| AppError::Internal(format!("Zip write failed: {}", e)))?;
        writer.write_all(&body)?;
        let cursor = writer
            .finish()
            .map_err(|e| AppError::Internal(format!("Zip finalize failed: {}", e)))?;
        Ok(Bytes::from(cursor.into_inner()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(chunks: Vec<&'static [u8]>) -> DataStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    async fn collect(mut stream: DataStream) -> AppResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    const CSV: &[u8] = b"id,name,city\n1,Ada,\"London, UK\"\n2,\"Grace \"\"Hopper\"\"\",NYC\n";

    #[test]
    fn test_csv_line_quoting() {
        assert_eq!(parse_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(
            parse_csv_line("1,\"London, UK\",x"),
            vec!["1", "London, UK", "x"]
        );
        assert_eq!(
            parse_csv_line("\"Grace \"\"Hopper\"\"\""),
            vec!["Grace \"Hopper\""]
        );
        assert_eq!(parse_csv_line("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_unsupported_conversion_rejected() {
        let plan = TransferPlan::new(DatasetFormat::Json, DatasetFormat::Csv, Compression::None);
        assert!(matches!(plan, Err(AppError::InvalidInput(_))));
        let plan = TransferPlan::new(DatasetFormat::Jsonl, DatasetFormat::Json, Compression::None);
        assert!(plan.is_err());
    }

    #[test]
    fn test_plan_metadata() {
        let raw =
            TransferPlan::new(DatasetFormat::Csv, DatasetFormat::Csv, Compression::None).unwrap();
        assert_eq!(raw.resumability, Resumability::ByteSeekable);
        assert_eq!(raw.output_size(42), Some(42));
        assert_eq!(raw.filename("trips"), "trips.csv");
        assert_eq!(raw.content_type(), "text/csv");

        let gz =
            TransferPlan::new(DatasetFormat::Csv, DatasetFormat::Jsonl, Compression::Gzip).unwrap();
        assert_eq!(gz.resumability, Resumability::RederiveAndDiscard);
        assert_eq!(gz.output_size(42), None);
        assert_eq!(gz.filename("trips"), "trips.jsonl.gz");
        assert_eq!(gz.content_type(), "application/gzip");

        let z = TransferPlan::new(DatasetFormat::Csv, DatasetFormat::Csv, Compression::Zip).unwrap();
        assert!(z.requires_materialization());
        assert_eq!(z.filename("trips"), "trips.csv.zip");
    }

    #[tokio::test]
    async fn test_csv_to_jsonl() {
        // Chunk boundary in the middle of a record on purpose.
        let src = stream_of(vec![&CSV[..20], &CSV[20..]]);
        let out = collect(csv_to_jsonl(src)).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], "1");
        assert_eq!(first["city"], "London, UK");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["name"], "Grace \"Hopper\"");
    }

    #[tokio::test]
    async fn test_csv_to_json_array() {
        let out = collect(csv_to_json_array(stream_of(vec![CSV]))).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["city"], "NYC");
    }

    #[tokio::test]
    async fn test_empty_csv_yields_empty_array() {
        let out = collect(csv_to_json_array(stream_of(vec![b"id,name\n"])))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_gzip_roundtrip() {
        let out = collect(gzip(stream_of(vec![&CSV[..10], &CSV[10..]])))
            .await
            .unwrap();

        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(&out[..]);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, CSV);
    }

    #[tokio::test]
    async fn test_zip_contains_entry() {
        let out = collect(zip_single(stream_of(vec![CSV]), 1 << 20, "trips.csv".to_string()))
            .await
            .unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
        assert_eq!(archive.len(), 1);
        use std::io::Read;
        let mut entry = archive.by_name("trips.csv").unwrap();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body, CSV);
    }

    #[tokio::test]
    async fn test_zip_ceiling_enforced() {
        let result = collect(zip_single(stream_of(vec![CSV]), 8, "trips.csv".to_string())).await;
        assert!(matches!(
            result,
            Err(AppError::TransformTooLarge { ceiling: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_prefix_resumes_mid_chunk() {
        let full = collect(stream_of(vec![CSV])).await.unwrap();
        let resumed = collect(discard_prefix(stream_of(vec![&CSV[..7], &CSV[7..]]), 10))
            .await
            .unwrap();
        assert_eq!(resumed, full[10..]);

        // Prefix concatenated with the resumed tail is the full output.
        let mut concat = full[..10].to_vec();
        concat.extend_from_slice(&resumed);
        assert_eq!(concat, full);
    }

    #[tokio::test]
    async fn test_discard_past_end_is_empty() {
        let out = collect(discard_prefix(stream_of(vec![b"abc"]), 100))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_identity_pipeline_passthrough() {
        let plan =
            TransferPlan::new(DatasetFormat::Csv, DatasetFormat::Csv, Compression::None).unwrap();
        let out = collect(plan.apply(stream_of(vec![CSV]), 1 << 20, "trips.csv"))
            .await
            .unwrap();
        assert_eq!(out, CSV);
    }

    #[tokio::test]
    async fn test_missing_trailing_newline() {
        let src = stream_of(vec![b"a,b\n1,2"]);
        let out = collect(csv_to_jsonl(src)).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["a"], "1");
        assert_eq!(v["b"], "2");
    }
}

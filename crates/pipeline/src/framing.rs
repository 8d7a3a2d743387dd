//! Wire framing for outbound broadcast batches: a single leading tag byte
//! so a client never has to guess from size alone whether the body that
//! follows is raw JSON or deflate-compressed JSON.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use model::Record;

/// Frame is sent uncompressed.
pub const TAG_RAW: u8 = 0x00;
/// Frame body is deflate-compressed.
pub const TAG_DEFLATE: u8 = 0x01;

/// Serializes `records` as a JSON array and, if the result exceeds
/// `compression_threshold` bytes, deflates it at level 6. Either way the
/// returned frame begins with a one-byte tag identifying which form
/// follows.
pub fn frame_batch(records: &[Record], compression_threshold: usize) -> Vec<u8> {
    let body = serde_json::to_vec(records).expect("Vec<Record> is always serializable");

    if body.len() <= compression_threshold {
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(TAG_RAW);
        frame.extend_from_slice(&body);
        return frame;
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(&body).expect("in-memory compression cannot fail");
    let compressed = encoder.finish().expect("in-memory compression cannot fail");

    let mut frame = Vec::with_capacity(compressed.len() + 1);
    frame.push(TAG_DEFLATE);
    frame.extend_from_slice(&compressed);
    frame
}

/// Decodes a frame produced by [`frame_batch`] back into its JSON body
/// bytes. Used by tests to verify the compression round-trips.
pub fn unframe(frame: &[u8]) -> Vec<u8> {
    use std::io::Read;

    let (tag, body) = frame.split_first().expect("frame must have a tag byte");
    match *tag {
        TAG_RAW => body.to_vec(),
        TAG_DEFLATE => {
            let mut decoder = flate2::read::DeflateDecoder::new(body);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).expect("valid deflate stream");
            out
        }
        other => panic!("unknown frame tag: {other}"),
    }
}

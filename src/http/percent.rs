//! In-place query value decoding.
//!
//! `+` becomes a space and `%XX` with two hex digits becomes the byte it
//! names. Every other byte is copied unchanged. The output is never longer
//! than the input, so decoding overwrites the source slice.

/// Decode `buf` in place and return the decoded length.
pub fn decode_in_place(buf: &mut [u8]) -> usize {
    let len = buf.len();
    let mut read = 0;
    let mut write = 0;

    while read < len {
        let byte = buf[read];
        let decoded = match byte {
            b'+' => b' ',
            b'%' if read + 2 < len => {
                match (hex_value(buf[read + 1]), hex_value(buf[read + 2])) {
                    (Some(hi), Some(lo)) => {
                        read += 2;
                        (hi << 4) | lo
                    }
                    _ => byte,
                }
            }
            _ => byte,
        };
        buf[write] = decoded;
        read += 1;
        write += 1;
    }

    write
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

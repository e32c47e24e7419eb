//! Binary-PPM frame codec for the UDP ingestion protocol.
//!
//! A packet is a P6 header followed by raw RGB bytes. Comment lines may
//! appear anywhere in the header; a `#FT: x y` comment carries a signed
//! placement offset. Header fields are separated by runs of whitespace,
//! and exactly one whitespace byte separates the maxval from the payload:
//!
//! ```text
//! P6\n[#FT: offsetX offsetY\n]width height\n255\n<width*height*3 bytes>
//! ```

/// Upper bound on either frame dimension; anything larger is dropped.
pub const MAX_DIMENSION: usize = 2048;

/// One decoded frame plus its placement offset on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    pub width: usize,
    pub height: usize,
    pub offset_x: i32,
    pub offset_y: i32,
    pub pixels: Vec<u8>,
}

/// Parse a packet. Returns `None` on any malformed input; the transport is
/// lossy by nature, so callers drop bad packets silently.
pub fn decode(packet: &[u8]) -> Option<WireFrame> {
    // The marker is literal and comes first; no filler before it.
    if !packet.starts_with(b"P6") {
        return None;
    }

    let mut reader = HeaderReader::new(packet);
    if reader.token()? != b"P6" {
        return None;
    }
    let width = parse_dimension(reader.token()?)?;
    let height = parse_dimension(reader.token()?)?;
    if reader.token()? != b"255" {
        return None;
    }

    // Exactly one whitespace byte between maxval and payload.
    if !packet.get(reader.pos)?.is_ascii_whitespace() {
        return None;
    }
    let payload = &packet[reader.pos + 1..];

    let needed = width * height * 3;
    if payload.len() < needed {
        return None;
    }

    let (offset_x, offset_y) = reader.offset;
    Some(WireFrame {
        width,
        height,
        offset_x,
        offset_y,
        pixels: payload[..needed].to_vec(),
    })
}

/// Build a packet from a framebuffer. The offset comment is emitted only
/// when the offset is nonzero, matching what remote senders expect.
pub fn encode(pixels: &[u8], width: usize, height: usize, offset_x: i32, offset_y: i32) -> Vec<u8> {
    debug_assert_eq!(pixels.len(), width * height * 3);

    let header = if offset_x != 0 || offset_y != 0 {
        format!("P6\n#FT: {offset_x} {offset_y}\n{width} {height}\n255\n")
    } else {
        format!("P6\n{width} {height}\n255\n")
    };

    let mut packet = Vec::with_capacity(header.len() + pixels.len());
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(pixels);
    packet
}

fn parse_dimension(token: &[u8]) -> Option<usize> {
    let value: usize = std::str::from_utf8(token).ok()?.parse().ok()?;
    (1..=MAX_DIMENSION).contains(&value).then_some(value)
}

/// Extract a `#FT: x y` offset from a comment line, if well formed.
fn parse_offset_comment(comment: &[u8]) -> Option<(i32, i32)> {
    let text = std::str::from_utf8(comment).ok()?;
    let rest = text.strip_prefix("#FT:")?;
    let mut parts = rest.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    Some((x, y))
}

struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
    offset: (i32, i32),
}

impl<'a> HeaderReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            offset: (0, 0),
        }
    }

    /// Skip whitespace and comment lines, remembering the last offset
    /// comment seen.
    fn skip_filler(&mut self) {
        loop {
            while self
                .data
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_whitespace())
            {
                self.pos += 1;
            }
            if self.data.get(self.pos) == Some(&b'#') {
                let start = self.pos;
                while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                    self.pos += 1;
                }
                if let Some(offset) = parse_offset_comment(&self.data[start..self.pos]) {
                    self.offset = offset;
                }
            } else {
                return;
            }
        }
    }

    /// Next whitespace-delimited header token.
    fn token(&mut self) -> Option<&'a [u8]> {
        self.skip_filler();
        let start = self.pos;
        while self
            .data
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'#')
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| &self.data[start..self.pos])
    }
}

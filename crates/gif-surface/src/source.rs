use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use crate::config::IterationCount;
use crate::error::{Error, Result};
use crate::repeat::RepeatPolicy;
use crate::stream::SharedStream;

/// Metadata of a frame that was just decoded into the back-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Position in the frame sequence (0-based).
    pub index: usize,
    /// Declared display delay before the next frame.
    pub delay: Duration,
    /// Pass over the sequence this frame belongs to (0-based).
    pub pass: u32,
}

/// Outcome of [`FrameSource::decode_next_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Frame(FrameInfo),
    /// The repeat policy permits no further passes.
    Exhausted,
}

/// GIF centiseconds to a duration.
fn frame_delay(frame: &gif::Frame<'_>) -> Duration {
    Duration::from_millis(u64::from(frame.delay) * 10)
}

/// Frame rectangle clipped to the logical screen, as `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Rect {
    fn clipped(frame: &gif::Frame<'_>, width: usize, height: usize) -> Self {
        let x0 = usize::from(frame.left).min(width);
        let y0 = usize::from(frame.top).min(height);
        Self {
            x0,
            y0,
            x1: (x0 + usize::from(frame.width)).min(width),
            y1: (y0 + usize::from(frame.height)).min(height),
        }
    }
}

/// Full-canvas RGBA compositing target. GIF frames may only cover part of
/// the screen and carry a disposal method applied before the next frame.
struct BackBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    snapshot: Option<Vec<u8>>,
    pending_disposal: Option<(gif::DisposalMethod, Rect)>,
}

impl BackBuffer {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
            snapshot: None,
            pending_disposal: None,
        }
    }

    fn reset(&mut self) {
        self.pixels.fill(0);
        self.pending_disposal = None;
    }

    fn draw(&mut self, frame: &gif::Frame<'_>) {
        if let Some((method, rect)) = self.pending_disposal.take() {
            self.dispose(method, rect);
        }

        if frame.dispose == gif::DisposalMethod::Previous {
            match self.snapshot.as_mut() {
                Some(snapshot) => snapshot.copy_from_slice(&self.pixels),
                None => self.snapshot = Some(self.pixels.clone()),
            }
        }

        let rect = Rect::clipped(frame, self.width, self.height);
        let src_stride = usize::from(frame.width) * 4;
        for y in rect.y0..rect.y1 {
            let src_row = (y - rect.y0) * src_stride;
            for x in rect.x0..rect.x1 {
                let si = src_row + (x - rect.x0) * 4;
                let Some(src) = frame.buffer.get(si..si + 4) else {
                    return;
                };
                // Fully transparent pixels leave the canvas untouched.
                if src[3] == 0 {
                    continue;
                }
                let di = (y * self.width + x) * 4;
                self.pixels[di..di + 4].copy_from_slice(src);
            }
        }

        self.pending_disposal = Some((frame.dispose, rect));
    }

    fn dispose(&mut self, method: gif::DisposalMethod, rect: Rect) {
        match method {
            gif::DisposalMethod::Background => {
                for y in rect.y0..rect.y1 {
                    let start = (y * self.width + rect.x0) * 4;
                    let end = (y * self.width + rect.x1) * 4;
                    self.pixels[start..end].fill(0);
                }
            }
            gif::DisposalMethod::Previous => {
                if let Some(snapshot) = &self.snapshot {
                    self.pixels.copy_from_slice(snapshot);
                }
            }
            gif::DisposalMethod::Any | gif::DisposalMethod::Keep => {}
        }
    }
}

fn open_decoder<R: Read + Seek>(
    stream: &SharedStream<R>,
    origin: u64,
) -> std::result::Result<gif::Decoder<SharedStream<R>>, String> {
    let mut reader = stream.clone();
    reader
        .seek(SeekFrom::Start(origin))
        .map_err(|e| format!("seek to stream start failed: {e}"))?;
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    options.read_info(reader).map_err(|e| e.to_string())
}

/// Stateful GIF decoder producing one composited frame at a time.
///
/// Not synchronized: the owner serializes access (in practice it lives on
/// the decode thread). Releasing the stream is the owner's job.
pub struct FrameSource<R: Read + Seek> {
    stream: SharedStream<R>,
    origin: u64,
    decoder: gif::Decoder<SharedStream<R>>,
    width: u32,
    height: u32,
    delays: Vec<Duration>,
    policy: RepeatPolicy,
    back: BackBuffer,
    next_index: usize,
    pass: u32,
    exhausted: bool,
}

impl<R: Read + Seek> FrameSource<R> {
    /// Parse the header and scan the frame table, then rewind to the first
    /// frame. Any failure here is a [`Error::Format`].
    pub fn open(stream: SharedStream<R>, iterations: IterationCount) -> Result<Self> {
        let origin = stream
            .clone()
            .stream_position()
            .map_err(|e| Error::argument(format!("The stream is not seekable: {e}")))?;

        let mut decoder = open_decoder(&stream, origin).map_err(Error::format)?;
        let width = u32::from(decoder.width());
        let height = u32::from(decoder.height());
        if width == 0 || height == 0 {
            return Err(Error::format(format!("invalid logical screen size {width}x{height}")));
        }
        let mut delays = Vec::new();
        loop {
            match decoder.read_next_frame() {
                Ok(Some(frame)) => delays.push(frame_delay(frame)),
                Ok(None) => break,
                Err(e) => return Err(Error::format(format!("frame {}: {e}", delays.len()))),
            }
        }
        if delays.is_empty() {
            return Err(Error::format("stream contains no frames"));
        }
        // The loop extension is only guaranteed parsed once frames were read.
        let policy = RepeatPolicy::resolve(iterations, decoder.repeat());

        let decoder = open_decoder(&stream, origin).map_err(Error::format)?;

        log::info!(
            "Opened GIF: {}x{}, {} frames, repeat {:?}",
            width,
            height,
            delays.len(),
            policy
        );

        Ok(Self {
            stream,
            origin,
            decoder,
            width,
            height,
            delays,
            policy,
            back: BackBuffer::new(width as usize, height as usize),
            next_index: 0,
            pass: 0,
            exhausted: false,
        })
    }

    /// Decode the next frame into the back-buffer, wrapping to the first
    /// frame when the sequence ends and the repeat policy allows another pass.
    pub fn decode_next_frame(&mut self) -> Result<Decoded> {
        loop {
            if self.exhausted || !self.policy.permits_pass(self.pass) {
                self.exhausted = true;
                return Ok(Decoded::Exhausted);
            }

            let index = self.next_index;
            let delay = match self.decoder.read_next_frame() {
                Ok(Some(frame)) => {
                    self.back.draw(frame);
                    Some(frame_delay(frame))
                }
                Ok(None) => None,
                Err(e) => return Err(Error::decode(format!("frame {index}: {e}"))),
            };

            if let Some(delay) = delay {
                self.next_index += 1;
                return Ok(Decoded::Frame(FrameInfo {
                    index,
                    delay,
                    pass: self.pass,
                }));
            }

            if index == 0 {
                return Err(Error::decode(format!("pass {} yielded no frames", self.pass)));
            }
            // Only bounded policies compare against `pass`, and they stop long
            // before it could wrap.
            self.pass = self.pass.wrapping_add(1);
            self.next_index = 0;
            if !self.policy.permits_pass(self.pass) {
                log::debug!("Frame sequence exhausted after {} passes", self.pass);
                self.exhausted = true;
                return Ok(Decoded::Exhausted);
            }
            self.decoder = open_decoder(&self.stream, self.origin)
                .map_err(|e| Error::decode(format!("rewind failed: {e}")))?;
            self.back.reset();
        }
    }

    /// Copy the back-buffer into `dest` as BGRA. `dest` is expected to be
    /// exactly `width * height * 4` bytes; a shorter region is only filled
    /// as far as it reaches.
    pub fn copy_into(&self, dest: &mut [u8]) {
        for (d, s) in dest.chunks_exact_mut(4).zip(self.back.pixels.chunks_exact(4)) {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = s[3];
        }
    }

    /// Current back-buffer contents, RGBA.
    pub fn back_buffer(&self) -> &[u8] {
        &self.back.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_count(&self) -> usize {
        self.delays.len()
    }

    pub fn frame_delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Sum of declared delays for one pass.
    pub fn pass_duration(&self) -> Duration {
        self.delays.iter().sum()
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

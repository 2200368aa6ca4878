//! Output buffering.
//!
//! [`OutputStack`] is an explicit stack of output frames. Host layers may push
//! their own frames; the page cache owns at most one frame, the capture frame,
//! which always sits at the bottom of the stack while capturing. Frames are
//! unwound strictly LIFO: flushing a frame appends its bytes to the frame
//! below it, or to the response sink when it is the last one.

use bytes::Bytes;

/// Owner of a buffering frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOwner {
    /// A frame opened by the surrounding host.
    Host,
    /// The page cache capture frame.
    Capture,
}

#[derive(Debug)]
struct Frame {
    owner: FrameOwner,
    buffer: Vec<u8>,
}

/// Stack of output buffers in front of the response sink.
#[derive(Debug, Default)]
pub struct OutputStack {
    frames: Vec<Frame>,
    sink: Vec<u8>,
}

impl OutputStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open frames.
    pub fn level(&self) -> usize {
        self.frames.len()
    }

    /// Open a new frame on top of the stack.
    pub fn push(&mut self, owner: FrameOwner) {
        self.frames.push(Frame {
            owner,
            buffer: Vec::new(),
        });
    }

    /// Write to the innermost frame, or straight to the sink when unbuffered.
    pub fn write(&mut self, bytes: &[u8]) {
        match self.frames.last_mut() {
            Some(frame) => frame.buffer.extend_from_slice(bytes),
            None => self.sink.extend_from_slice(bytes),
        }
    }

    /// Close the innermost frame, passing its bytes outwards.
    pub fn end_flush(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        self.write(&frame.buffer);
        true
    }

    /// Close the innermost frame, discarding its bytes.
    pub fn end_clean(&mut self) -> bool {
        self.frames.pop().is_some()
    }

    /// Close the innermost frame and hand its bytes to the caller.
    pub fn get_clean(&mut self) -> Option<Vec<u8>> {
        self.frames.pop().map(|frame| frame.buffer)
    }

    /// Bytes buffered in the innermost frame.
    pub fn contents(&self) -> Option<&[u8]> {
        self.frames.last().map(|frame| frame.buffer.as_slice())
    }

    /// True when the bottom frame is the capture frame.
    pub fn is_capturing(&self) -> bool {
        self.frames
            .first()
            .is_some_and(|frame| frame.owner == FrameOwner::Capture)
    }

    /// Make the capture frame the first and only frame.
    ///
    /// Frames opened earlier by the host are closed and their bytes are
    /// dropped, so nothing wraps outside the capture frame.
    pub fn begin_capture(&mut self) {
        while self.end_clean() {}
        self.push(FrameOwner::Capture);
    }

    /// Flush every frame stacked above the capture frame into it.
    ///
    /// The capture frame itself stays open.
    pub fn flush_nested(&mut self) {
        while self.frames.len() > 1 {
            self.end_flush();
        }
    }

    /// Flush all frames and return everything written to the sink.
    pub fn finish(mut self) -> Bytes {
        while self.end_flush() {}
        Bytes::from(self.sink)
    }
}

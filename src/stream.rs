//! MJPEG over `multipart/x-mixed-replace`.
//!
//! Each camera frame becomes one part: a small header with the JPEG length,
//! the JPEG bytes, then the boundary line. The loop has no pacing of its own.
//! A blocking transport write holds it to the client's read rate.

use embedded_io::{Error as _, Write};
use log::{error, info};

use crate::camera::{Frame, FrameSource};

macro_rules! boundary {
    () => {
        "frame"
    };
}

pub const CONTENT_TYPE: &str = concat!("multipart/x-mixed-replace; boundary=", boundary!());
pub const PART_BOUNDARY: &str = concat!("\r\n--", boundary!(), "\r\n");

/// Quality used when a frame has to be compressed in software.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const PART_PREFIX: &[u8] = b"Content-Type: image/jpeg\r\nContent-Length: ";
const PART_SUFFIX: &[u8] = b"\r\n\r\n";
// Room for the template plus the longest `usize`.
const PART_HEADER_CAPACITY: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("camera capture failed")]
    Capture,
    #[error("JPEG compression failed")]
    Encode,
    #[error("stream write failed: {0:?}")]
    Write(embedded_io::ErrorKind),
}

pub struct PartHeader {
    buf: [u8; PART_HEADER_CAPACITY],
    len: usize,
}

impl PartHeader {
    pub fn new(content_length: usize) -> Self {
        let mut digits = itoa::Buffer::new();
        let digits = digits.format(content_length).as_bytes();

        let mut buf = [0u8; PART_HEADER_CAPACITY];
        let mut len = 0;
        for piece in [PART_PREFIX, digits, PART_SUFFIX] {
            buf[len..len + piece.len()].copy_from_slice(piece);
            len += piece.len();
        }

        Self { buf, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Write one complete part: header, JPEG bytes, boundary.
pub fn write_part<W: Write>(out: &mut W, jpeg: &[u8]) -> Result<(), StreamError> {
    let header = PartHeader::new(jpeg.len());
    out.write_all(header.as_bytes()).map_err(write_error)?;
    out.write_all(jpeg).map_err(write_error)?;
    out.write_all(PART_BOUNDARY.as_bytes()).map_err(write_error)?;
    Ok(())
}

fn write_error<E: embedded_io::Error>(err: E) -> StreamError {
    StreamError::Write(err.kind())
}

/// A single JPEG image, either the driver's own frame or a converted copy.
pub enum Snapshot<S: FrameSource> {
    Native(S::Frame),
    Converted(S::Jpeg),
}

impl<S: FrameSource> AsRef<[u8]> for Snapshot<S> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Snapshot::Native(frame) => frame.data(),
            Snapshot::Converted(jpeg) => jpeg.as_ref(),
        }
    }
}

/// Grab one frame as JPEG, compressing it when the sensor is not in JPEG mode.
///
/// A raw frame goes back to the driver as soon as it is compressed, and on
/// every error path.
pub fn capture_jpeg<S: FrameSource>(
    source: &mut S,
    quality: u8,
) -> Result<Snapshot<S>, StreamError> {
    let frame = source.acquire().ok_or(StreamError::Capture)?;

    if frame.format().is_jpeg() {
        return Ok(Snapshot::Native(frame));
    }

    let jpeg = source.encode_jpeg(&frame, quality);
    drop(frame);
    jpeg.map(Snapshot::Converted).ok_or(StreamError::Encode)
}

/// One MJPEG connection fed by a frame source.
pub struct MjpegStream<S> {
    source: S,
    quality: u8,
    frames_sent: u64,
}

impl<S: FrameSource> MjpegStream<S> {
    pub fn new(source: S, quality: u8) -> Self {
        Self {
            source,
            quality,
            frames_sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Stream until capture, compression or the transport fails.
    ///
    /// Only ever returns the reason the stream ended. A write failure is
    /// how a client disconnect shows up.
    pub fn run<W: Write>(&mut self, out: &mut W) -> StreamError {
        loop {
            match self.send_next(out) {
                Ok(()) => self.frames_sent += 1,
                Err(err) => {
                    match err {
                        StreamError::Write(kind) => info!(
                            "Stream client gone after {} frames ({kind:?})",
                            self.frames_sent
                        ),
                        StreamError::Capture | StreamError::Encode => {
                            error!("{err} after {} frames", self.frames_sent)
                        }
                    }
                    return err;
                }
            }
        }
    }

    fn send_next<W: Write>(&mut self, out: &mut W) -> Result<(), StreamError> {
        let jpeg = capture_jpeg(&mut self.source, self.quality)?;
        write_part(out, jpeg.as_ref())
    }
}

#[cfg(test)]
impl<S> MjpegStream<S> {
    fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PixelFormat;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Acquired(usize),
        Released(usize),
        Encoded(usize),
        Freed(usize),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Shot {
        format: PixelFormat,
        data: Vec<u8>,
    }

    impl Shot {
        fn jpeg(len: usize) -> Self {
            Self {
                format: PixelFormat::Jpeg,
                data: vec![0xAB; len],
            }
        }

        fn rgb565(len: usize) -> Self {
            Self {
                format: PixelFormat::Rgb565,
                data: vec![0x11; len],
            }
        }

        fn grayscale(len: usize) -> Self {
            Self {
                format: PixelFormat::Grayscale,
                data: vec![0x80; len],
            }
        }
    }

    struct TestFrame {
        id: usize,
        format: PixelFormat,
        data: Vec<u8>,
        log: Log,
    }

    impl Frame for TestFrame {
        fn format(&self) -> PixelFormat {
            self.format
        }

        fn data(&self) -> &[u8] {
            &self.data
        }
    }

    impl Drop for TestFrame {
        fn drop(&mut self) {
            self.log.borrow_mut().push(Event::Released(self.id));
        }
    }

    struct TestJpeg {
        id: usize,
        data: Vec<u8>,
        log: Log,
    }

    impl AsRef<[u8]> for TestJpeg {
        fn as_ref(&self) -> &[u8] {
            &self.data
        }
    }

    impl Drop for TestJpeg {
        fn drop(&mut self) {
            self.log.borrow_mut().push(Event::Freed(self.id));
        }
    }

    /// Plays back a fixed script of captures. `None` is a failed capture.
    struct ScriptedCamera {
        script: VecDeque<Option<Shot>>,
        next_id: usize,
        encoder_works: bool,
        qualities: Vec<u8>,
        log: Log,
    }

    impl ScriptedCamera {
        fn new(script: Vec<Option<Shot>>) -> Self {
            Self {
                script: script.into(),
                next_id: 0,
                encoder_works: true,
                qualities: Vec::new(),
                log: Log::default(),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.log.borrow().clone()
        }

        fn count(&self, pick: fn(&Event) -> bool) -> usize {
            self.log.borrow().iter().filter(|e| pick(e)).count()
        }
    }

    impl FrameSource for ScriptedCamera {
        type Frame = TestFrame;
        type Jpeg = TestJpeg;

        fn acquire(&mut self) -> Option<TestFrame> {
            let shot = self.script.pop_front().flatten()?;
            let id = self.next_id;
            self.next_id += 1;
            self.log.borrow_mut().push(Event::Acquired(id));
            Some(TestFrame {
                id,
                format: shot.format,
                data: shot.data,
                log: self.log.clone(),
            })
        }

        fn encode_jpeg(&mut self, frame: &TestFrame, quality: u8) -> Option<TestJpeg> {
            self.qualities.push(quality);
            if !self.encoder_works {
                return None;
            }
            self.log.borrow_mut().push(Event::Encoded(frame.id));
            // Pretend compression shrinks the frame to a third.
            let mut data = vec![0xFF, 0xD8];
            data.resize(frame.data.len() / 3, 0x42);
            Some(TestJpeg {
                id: frame.id,
                data,
                log: self.log.clone(),
            })
        }
    }

    /// Collects every chunk. Fails every write from `fail_at` on.
    #[derive(Default)]
    struct Sink {
        chunks: Vec<Vec<u8>>,
        fail_at: Option<usize>,
    }

    impl embedded_io::ErrorType for Sink {
        type Error = embedded_io::ErrorKind;
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.fail_at.is_some_and(|at| self.chunks.len() >= at) {
                return Err(embedded_io::ErrorKind::ConnectionReset);
            }
            self.chunks.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn is_acquired(e: &Event) -> bool {
        matches!(e, Event::Acquired(_))
    }

    fn is_released(e: &Event) -> bool {
        matches!(e, Event::Released(_))
    }

    fn is_freed(e: &Event) -> bool {
        matches!(e, Event::Freed(_))
    }

    #[test]
    fn part_header_matches_multipart_template() {
        assert_eq!(
            PartHeader::new(1234).as_bytes(),
            b"Content-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"
        );
        assert!(PartHeader::new(usize::MAX).as_bytes().ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn content_type_names_the_boundary() {
        assert_eq!(CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame");
        assert_eq!(PART_BOUNDARY, "\r\n--frame\r\n");
    }

    #[test]
    fn jpeg_frames_are_sent_as_parts_until_capture_fails() {
        let camera = ScriptedCamera::new(vec![
            Some(Shot::jpeg(10)),
            Some(Shot::jpeg(20)),
            Some(Shot::jpeg(30)),
            None,
        ]);
        let mut stream = MjpegStream::new(camera, DEFAULT_JPEG_QUALITY);
        let mut sink = Sink::default();

        assert_eq!(stream.run(&mut sink), StreamError::Capture);
        assert_eq!(stream.frames_sent(), 3);

        assert_eq!(sink.chunks.len(), 9);
        for (part, len) in sink.chunks.chunks(3).zip([10usize, 20, 30]) {
            assert_eq!(part[0], PartHeader::new(len).as_bytes());
            assert_eq!(part[1], vec![0xAB; len]);
            assert_eq!(part[2], PART_BOUNDARY.as_bytes());
        }

        let camera = stream.into_source();
        assert_eq!(camera.count(is_acquired), 3);
        assert_eq!(camera.count(is_released), 3);
        assert!(camera.qualities.is_empty());
    }

    #[test]
    fn every_frame_is_released_exactly_once() {
        let camera = ScriptedCamera::new(vec![
            Some(Shot::jpeg(4)),
            Some(Shot::rgb565(90)),
            Some(Shot::jpeg(8)),
            Some(Shot::rgb565(30)),
            None,
        ]);
        let mut stream = MjpegStream::new(camera, DEFAULT_JPEG_QUALITY);

        assert_eq!(stream.run(&mut Sink::default()), StreamError::Capture);
        assert_eq!(stream.frames_sent(), 4);

        let camera = stream.into_source();
        for id in 0..4 {
            let released = camera
                .events()
                .iter()
                .filter(|e| **e == Event::Released(id))
                .count();
            assert_eq!(released, 1, "frame {id}");
        }
        assert_eq!(camera.count(is_freed), 2);
    }

    #[test]
    fn converted_frame_declares_converted_length() {
        let camera = ScriptedCamera::new(vec![Some(Shot::rgb565(300)), Some(Shot::jpeg(5)), None]);
        let mut stream = MjpegStream::new(camera, DEFAULT_JPEG_QUALITY);
        let mut sink = Sink::default();

        stream.run(&mut sink);

        assert_eq!(sink.chunks[0], PartHeader::new(100).as_bytes());
        assert_eq!(sink.chunks[1].len(), 100);
        assert_eq!(&sink.chunks[1][..2], &[0xFF, 0xD8]);

        let camera = stream.into_source();
        assert_eq!(camera.qualities, vec![DEFAULT_JPEG_QUALITY]);
        assert_eq!(
            camera.events(),
            vec![
                Event::Acquired(0),
                Event::Encoded(0),
                Event::Released(0),
                Event::Freed(0),
                Event::Acquired(1),
                Event::Released(1),
            ]
        );
    }

    #[test]
    fn encode_failure_ends_stream_and_returns_frame() {
        let mut camera = ScriptedCamera::new(vec![Some(Shot::jpeg(6)), Some(Shot::rgb565(60))]);
        camera.encoder_works = false;
        let mut stream = MjpegStream::new(camera, 55);
        let mut sink = Sink::default();

        assert_eq!(stream.run(&mut sink), StreamError::Encode);
        assert_eq!(stream.frames_sent(), 1);
        assert_eq!(sink.chunks.len(), 3);

        let camera = stream.into_source();
        assert_eq!(camera.qualities, vec![55]);
        assert_eq!(camera.count(is_acquired), 2);
        assert_eq!(camera.count(is_released), 2);
        assert_eq!(camera.count(is_freed), 0);
    }

    #[test]
    fn write_failure_ends_stream_without_leaks() {
        let camera = ScriptedCamera::new(vec![
            Some(Shot::jpeg(6)),
            Some(Shot::rgb565(60)),
            Some(Shot::jpeg(6)),
        ]);
        let mut stream = MjpegStream::new(camera, DEFAULT_JPEG_QUALITY);
        // Header of the second part goes through, its body does not.
        let mut sink = Sink {
            fail_at: Some(4),
            ..Sink::default()
        };

        assert_eq!(
            stream.run(&mut sink),
            StreamError::Write(embedded_io::ErrorKind::ConnectionReset)
        );
        assert_eq!(stream.frames_sent(), 1);
        assert_eq!(sink.chunks.len(), 4);

        let camera = stream.into_source();
        assert_eq!(camera.count(is_acquired), 2);
        assert_eq!(camera.count(is_released), 2);
        assert_eq!(camera.count(is_freed), 1);
    }

    #[test]
    fn single_capture_passes_jpeg_frame_through() {
        let mut camera = ScriptedCamera::new(vec![Some(Shot::jpeg(12))]);

        let snapshot = capture_jpeg(&mut camera, DEFAULT_JPEG_QUALITY).unwrap();
        assert!(matches!(snapshot, Snapshot::Native(_)));
        assert_eq!(snapshot.as_ref(), &[0xAB; 12][..]);
        assert_eq!(camera.count(is_released), 0);

        drop(snapshot);
        assert_eq!(camera.events(), vec![Event::Acquired(0), Event::Released(0)]);
        assert!(camera.qualities.is_empty());
    }

    #[test]
    fn single_capture_returns_raw_frame_before_handing_out_jpeg() {
        let mut camera = ScriptedCamera::new(vec![Some(Shot::rgb565(90))]);

        let snapshot = capture_jpeg(&mut camera, 70).unwrap();
        assert_eq!(snapshot.as_ref().len(), 30);
        assert_eq!(
            camera.events(),
            vec![Event::Acquired(0), Event::Encoded(0), Event::Released(0)]
        );

        drop(snapshot);
        assert_eq!(camera.count(is_freed), 1);
        assert_eq!(camera.qualities, vec![70]);
    }

    #[test]
    fn single_capture_failures_leave_nothing_held() {
        let mut camera = ScriptedCamera::new(vec![None]);
        assert!(matches!(
            capture_jpeg(&mut camera, DEFAULT_JPEG_QUALITY),
            Err(StreamError::Capture)
        ));
        assert!(camera.events().is_empty());

        let mut camera = ScriptedCamera::new(vec![Some(Shot::grayscale(40))]);
        camera.encoder_works = false;
        assert!(matches!(
            capture_jpeg(&mut camera, DEFAULT_JPEG_QUALITY),
            Err(StreamError::Encode)
        ));
        assert_eq!(camera.events(), vec![Event::Acquired(0), Event::Released(0)]);
    }

    #[test]
    fn disconnect_before_first_part() {
        let camera = ScriptedCamera::new(vec![Some(Shot::jpeg(6))]);
        let mut stream = MjpegStream::new(camera, DEFAULT_JPEG_QUALITY);
        let mut sink = Sink {
            fail_at: Some(0),
            ..Sink::default()
        };

        assert!(matches!(stream.run(&mut sink), StreamError::Write(_)));
        assert_eq!(stream.frames_sent(), 0);
        assert!(sink.chunks.is_empty());
        assert_eq!(stream.into_source().count(is_released), 1);
    }
}

//! Scripted capture sources for tests

use image::RgbImage;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::{CaptureBackend, CaptureError, CaptureSource, DeviceProvider, Frame};

/// One scripted result of `next_frame`
#[derive(Debug, Clone, Copy)]
pub enum Read {
    /// A valid frame of the given size
    Frame(u32, u32),
    /// The driver returned nothing
    Empty,
    /// The backend raised an error
    Error,
}

/// Counters shared between a provider and the sources it hands out
#[derive(Debug, Default)]
pub struct Journal {
    pub opens: Vec<(u32, CaptureBackend)>,
    pub reads: u32,
    pub releases: u32,
    pub resolution_requests: Vec<(u32, u32)>,
}

pub struct ScriptedSource {
    reads: Rc<RefCell<VecDeque<Read>>>,
    journal: Rc<RefCell<Journal>>,
    fallback: Read,
    open: bool,
    reject_resolution: bool,
}

impl CaptureSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.journal.borrow_mut().reads += 1;
        let next = self.reads.borrow_mut().pop_front().unwrap_or(self.fallback);
        match next {
            Read::Frame(w, h) => Ok(Some(Frame::new(RgbImage::new(w, h)))),
            Read::Empty => Ok(None),
            Read::Error => Err(CaptureError::Backend("scripted read error".to_string())),
        }
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        self.journal
            .borrow_mut()
            .resolution_requests
            .push((width, height));
        if self.reject_resolution {
            Err(CaptureError::Unsupported("scripted resolution failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.journal.borrow_mut().releases += 1;
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Provider whose devices behave according to a script.
///
/// Every `(index, backend)` pair not explicitly scripted fails to open. Reads
/// on a pair consume its shared queue, so reads across reopen cycles continue
/// where the previous source left off; once the queue is drained the
/// pair's fallback result is returned forever.
#[derive(Default)]
pub struct ScriptedDevices {
    devices: HashMap<(u32, CaptureBackend), ScriptedDevice>,
    pub journal: Rc<RefCell<Journal>>,
    reject_resolution: bool,
}

struct ScriptedDevice {
    reads: Rc<RefCell<VecDeque<Read>>>,
    fallback: Read,
}

impl ScriptedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a device: queued reads, then `fallback` forever
    pub fn device(
        mut self,
        index: u32,
        backend: CaptureBackend,
        reads: impl IntoIterator<Item = Read>,
        fallback: Read,
    ) -> Self {
        self.devices.insert(
            (index, backend),
            ScriptedDevice {
                reads: Rc::new(RefCell::new(reads.into_iter().collect())),
                fallback,
            },
        );
        self
    }

    /// Make every `set_resolution` call fail
    pub fn rejecting_resolution(mut self) -> Self {
        self.reject_resolution = true;
        self
    }
}

impl DeviceProvider for ScriptedDevices {
    fn open(
        &mut self,
        index: u32,
        backend: CaptureBackend,
    ) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let device = self
            .devices
            .get(&(index, backend))
            .ok_or_else(|| CaptureError::Open {
                index,
                backend,
                reason: "not scripted".to_string(),
            })?;
        self.journal.borrow_mut().opens.push((index, backend));

        Ok(Box::new(ScriptedSource {
            reads: Rc::clone(&device.reads),
            journal: Rc::clone(&self.journal),
            fallback: device.fallback,
            open: true,
            reject_resolution: self.reject_resolution,
        }))
    }
}

use std::io::Write;
use std::sync::{Arc, Mutex};

/// An in-memory [Write] whose contents remain accessible after the writer was handed off, e.g.
///  to a CSV log
#[derive(Clone, Default)]
pub struct SharedBuf {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    pub fn new() -> SharedBuf {
        Default::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock().unwrap()).to_string()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.lock().unwrap()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

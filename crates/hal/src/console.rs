// Console output routing.
// The kernel registers a sink (serial on hardware, a capture buffer or stdout
// when hosted); text printed before a sink exists is dropped.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicPtr, Ordering};

pub type OutputFn = fn(&str);

static OUTPUT: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Route all console output to `sink`, replacing any previous sink.
pub fn set_output(sink: OutputFn) {
    OUTPUT.store(sink as *mut (), Ordering::SeqCst);
}

pub fn clear_output() {
    OUTPUT.store(core::ptr::null_mut(), Ordering::SeqCst);
}

pub fn has_output() -> bool {
    !OUTPUT.load(Ordering::SeqCst).is_null()
}

struct SinkWriter(OutputFn);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(s);
        Ok(())
    }
}

pub fn _print(args: fmt::Arguments) {
    let ptr = OUTPUT.load(Ordering::SeqCst);
    if ptr.is_null() {
        return;
    }
    // SAFETY: OUTPUT only ever holds null or a pointer produced from an OutputFn in set_output
    let sink: OutputFn = unsafe { core::mem::transmute::<*mut (), OutputFn>(ptr) };
    let _ = SinkWriter(sink).write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Mutex;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(s: &str) {
        CAPTURED.lock().unwrap().push_str(s);
    }

    #[test]
    fn test_println_reaches_sink() {
        set_output(capture);
        assert!(has_output());
        crate::println!("frame {:#x} poisoned", 0x8020_0000usize);
        clear_output();
        crate::println!("dropped without a sink");

        let out = CAPTURED.lock().unwrap().clone();
        assert!(out.contains("frame 0x80200000 poisoned\n"));
        assert!(!out.contains("dropped without a sink"));
    }
}

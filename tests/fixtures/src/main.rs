use std::io::{Write, stdout};
use std::thread;
use std::time::Duration;

/// `repr(C)` so the record matches the classic C fixture byte for
/// byte: offsets 0, 4, 8, 16; total size 24. The fields are read by
/// the external inspector, never by this process.
#[repr(C)]
#[allow(dead_code)]
pub struct InnerRecord {
    pub inner_int: i32,
    pub inner_double: f64,
}

#[repr(C)]
#[allow(dead_code)]
pub struct OuterRecord {
    pub outer_int: i32,
    pub outer_char: u8,
    pub inner: InnerRecord,
}

/// The inspection target. `static mut` keeps it in `.data` (an
/// immutable static with these initializers would land in `.rodata`)
/// and `#[no_mangle]` keeps the symbol name readable in the symbol
/// table. Never written after initialization.
#[no_mangle]
pub static mut GLOBAL_RECORD: OuterRecord = OuterRecord {
    outer_int: 42,
    outer_char: b'A',
    inner: InnerRecord {
        inner_int: 123,
        inner_double: 3.14159,
    },
};

fn main() {
    // The two printed lines are the entire contract with the harness.
    let addr = unsafe { std::ptr::addr_of!(GLOBAL_RECORD) };
    println!("Global struct address: {:p}", addr);
    println!("PID: {}", unsafe { libc::getpid() });
    stdout().flush().expect("stdout flush");

    // Stay alive until the harness kills us.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

//! Shared helpers for the integration tests

#![allow(dead_code)] // not every test file uses every helper

use dbn::vm::canvas::SIZE;
use dbn::vm::Canvas;
use dbn::Interpreter;

/// Compiles and runs a program, panicking with context on any failure
pub fn run(source: &str) -> Interpreter {
    dbn::run_source(source).unwrap_or_else(|e| panic!("program failed: {e}\nsource:\n{source}"))
}

/// Compiles and runs a program, expecting it to fail
pub fn run_fail(source: &str) -> dbn::Error {
    match dbn::run_source(source) {
        Ok(_) => panic!("program unexpectedly succeeded:\n{source}"),
        Err(e) => e,
    }
}

/// Asserts every pixel of the canvas holds the given raster gray
pub fn assert_uniform(canvas: &Canvas, expected: u8) {
    for y in 0..SIZE as i64 {
        for x in 0..SIZE as i64 {
            let actual = canvas.get_raster(x, y).unwrap();
            assert_eq!(
                actual, expected,
                "raster ({x}, {y}) is {actual}, expected {expected}"
            );
        }
    }
}

/// Asserts the dot at DBN (x, y) reads back as the given DBN value
pub fn assert_dot(vm: &Interpreter, x: i64, y: i64, expected: i64) {
    let actual = vm.canvas().read_dot(x, y);
    assert_eq!(
        actual, expected,
        "dot ({x}, {y}) reads {actual}, expected {expected}"
    );
}

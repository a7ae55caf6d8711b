#![allow(dead_code)]

use rox::lox::{Lox, Options, SharedBuffer, Status};

/// What one run of a program produced.
pub struct Outcome {
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `source` in a fresh session with default options.
pub fn run(source: &str) -> Outcome {
    run_with(source, Options::default())
}

pub fn run_with(source: &str, options: Options) -> Outcome {
    let buffer = SharedBuffer::new();
    let mut session = Lox::with_output(options, Box::new(buffer.clone()));

    let status = session.run(source);
    finish(&session, status, &buffer)
}

/// A session whose printed output can be read back between runs.
pub fn session() -> (Lox, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let session = Lox::with_output(Options::default(), Box::new(buffer.clone()));
    (session, buffer)
}

pub fn finish(session: &Lox, status: Status, buffer: &SharedBuffer) -> Outcome {
    let mut stderr = Vec::new();
    session
        .diagnostics()
        .emit(&mut stderr)
        .expect("writing to a Vec cannot fail");

    Outcome {
        status,
        stdout: buffer.contents(),
        stderr: String::from_utf8(stderr).expect("diagnostics are UTF-8"),
    }
}

/// Runs `source`, asserting it succeeds, and returns its printed lines.
pub fn output_of(source: &str) -> Vec<String> {
    let outcome = run(source);
    assert_eq!(
        outcome.status,
        Status::Ok,
        "program failed:\n{}",
        outcome.stderr
    );
    outcome.stdout.lines().map(str::to_owned).collect()
}

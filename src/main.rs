//! rivalscan CLI binary.
//!
//! Thin entrypoint: all logic lives in the library, and `cli::run()` owns
//! every byte of terminal output including error reports. main only maps
//! the returned exit code onto the process exit status.

fn main() {
    if let Err(code) = rivalscan::cli::run() {
        std::process::exit(code.as_i32());
    }
}

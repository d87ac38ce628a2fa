//! `sft` — reliable file transfer over a point-to-point serial link.

fn main() {
    std::process::exit(cli::run().as_i32());
}

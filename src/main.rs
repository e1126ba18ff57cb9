#![allow(non_snake_case)]
use RustedDAE::Examples::dae_examples::dae_examples;
use std::env;

fn main() {
    // example number from the command line, growth problem by default
    let example = env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(0);
    match dae_examples(example) {
        Ok(report) => println!("finished at t = {}", report.t),
        Err(e) => {
            eprintln!("example {} failed: {}", example, e);
            std::process::exit(1);
        }
    }
}

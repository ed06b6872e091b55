use std::process;

fn main() {
    process::exit(javafmt::bootstrap_cli());
}

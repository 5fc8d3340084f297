fn main() {
    if let Err(err) = agristat::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn main() {
    if let Err(err) = lipd_managed::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

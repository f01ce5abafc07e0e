fn main() {
    if let Err(e) = dosekeeper_lib::run() {
        eprintln!("dosekeeper: {e}");
        std::process::exit(1);
    }
}

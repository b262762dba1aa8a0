fn main() {
    if let Err(error) = treeline_cli::run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

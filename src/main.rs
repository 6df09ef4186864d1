fn main() {
    if let Err(err) = perplexity_cli::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

fn main() {
    std::process::exit(ember::cli::run());
}

fn main() {
    if let Err(err) = backup_reconciler::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

use ftpup_client::run_cli;

fn main() {
    std::process::exit(run_cli());
}

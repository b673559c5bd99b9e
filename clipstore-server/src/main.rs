use anyhow::Result;

fn main() -> Result<()> {
    clipstore_server::cli::execute()
}

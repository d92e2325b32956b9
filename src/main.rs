use anyhow::Result;

fn main() -> Result<()> {
    notes_client::cli::run()
}

fn main() -> anyhow::Result<()> {
    quotesync::cli::run()
}

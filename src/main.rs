fn main() -> anyhow::Result<()> {
    fleetview::run()
}

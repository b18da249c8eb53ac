fn main() -> anyhow::Result<()> {
    physio_tracker_lib::run()
}

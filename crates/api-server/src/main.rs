fn main() -> anyhow::Result<()> {
    // One cooperative event loop; the cache is still safe across threads.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(api_server::run_server())
}

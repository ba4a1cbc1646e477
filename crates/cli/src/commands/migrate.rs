use crate::commands::{prepare, CommandResult};
use tally_core::config::StoreBackend;
use tally_store::{connect_with_settings, migrations, redact_url};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    match config.store_backend() {
        Some(StoreBackend::Sqlite) => {}
        Some(backend) => {
            return CommandResult::success(
                "migrate",
                format!("{} store has no schema; nothing to migrate", backend.label()),
            );
        }
        None => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("unsupported store url `{}`", redact_url(&config.store.url)),
                2,
            );
        }
    }

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.store.url,
            config.store.max_connections,
            (config.store.timeout_ms / 1_000).max(1),
        )
        .await
        .map_err(|error| ("store_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

use chrono::NaiveDate;
use kodbook_core::domain::order::OrderCode;
use kodbook_db::{connect_from_config, migrations, OrderRepository, SqlOrderRepository};

use crate::commands::{prepare, CommandResult};

pub fn run(date: NaiveDate, codes: &[String]) -> CommandResult {
    let codes = match normalize_codes(codes) {
        Ok(codes) => codes,
        Err(message) => return CommandResult::failure("seed", "invalid_input", message, 2),
    };

    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlOrderRepository::new(pool.clone());
        let added = repository
            .register_codes(date, &codes)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let open = repository
            .list_available_codes(date, true)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<(usize, usize), (&'static str, String, u8)>((added, open.len()))
    });

    match result {
        Ok((added, open)) => CommandResult::success(
            "seed",
            format!(
                "registered {added} new of {} codes for {date}; {open} open for assignment",
                codes.len()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

/// Trims codes and drops repeats, keeping first-seen order.
fn normalize_codes(raw: &[String]) -> Result<Vec<OrderCode>, String> {
    let mut codes: Vec<OrderCode> = Vec::with_capacity(raw.len());
    for value in raw {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("codes must not be blank".to_string());
        }
        let code = OrderCode::new(trimmed);
        if !code.fits_button() {
            return Err(format!("code `{trimmed}` is longer than {} bytes", OrderCode::MAX_LEN));
        }
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    if codes.is_empty() {
        return Err("at least one code is required".to_string());
    }
    Ok(codes)
}

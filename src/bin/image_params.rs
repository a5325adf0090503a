use std::env;

use minato::image_optimizer::{self, ImageRequestContext};

/// Prints the parameters the creation hub would request for a category and
/// prompt, e.g. `image_params logo-brand "a fox mascot, transparent"`.
fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = env::args().skip(1);
    let Some(category) = args.next() else {
        let categories: Vec<&str> = image_optimizer::known_categories().collect();
        eprintln!("usage: image_params <category> [prompt...]");
        eprintln!("categories: {}", categories.join(", "));
        std::process::exit(2);
    };
    let prompt = args.collect::<Vec<_>>().join(" ");

    let ctx = ImageRequestContext {
        category_id: Some(category.clone()),
        prompt,
        ..Default::default()
    };
    let params = image_optimizer::optimize(&ctx);
    log::info!("Resolved parameters for '{}'", category);
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

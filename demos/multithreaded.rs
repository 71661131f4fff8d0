use std::sync::Arc;
use std::thread;

use flipside::{Actor, Config, Scope};

fn main() -> flipside::Result<()> {
    let config = serde_json::from_str::<Config>(r#"{ "backend": { "kind": "memory" } }"#)
        .expect("invalid config");
    let flags = Arc::new(config.build()?);

    flags.register("staff", |actor, _| actor.is("staff"));
    flags.register("beta", |actor, ids| actor.in_set("id", ids));
    flags.enable("search", "staff", flipside::ValueSet::new())?;

    // Each thread opens the beta for its own id, then checks visibility.
    let handles: Vec<_> = (0..4_i64)
        .map(|i| {
            let flags = Arc::clone(&flags);
            thread::spawn(move || -> flipside::Result<()> {
                flags.enable("search", "beta", [i])?;
                let actor = Actor::new().set("id", i).set("staff", i == 0);
                println!("Thread {i}: search = {}", flags.enabled("search", &actor)?);
                Ok(())
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap()?;
    }

    for (feature, rules) in flags.breakdown()? {
        println!("{feature}: {rules}");
    }
    flags.clear(Scope::All)?;
    Ok(())
}

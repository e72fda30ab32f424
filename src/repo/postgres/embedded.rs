refinery::embed_migrations!("./src/repo/postgres/migrations");

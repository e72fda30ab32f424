use barrel::backend::Pg;
use barrel::functions::AutogenFunction;
use barrel::{types, Migration};

pub(crate) fn migration() -> String {
    let mut m = Migration::new();

    m.create_table("videos", |t| {
        t.add_column(
            "id",
            types::uuid().primary(true).unique(true).nullable(false),
        );
        t.add_column(
            "created_at",
            types::custom("TIMESTAMPTZ")
                .nullable(false)
                .default(AutogenFunction::CurrentTimestamp),
        );
        t.add_column(
            "updated_at",
            types::custom("TIMESTAMPTZ")
                .nullable(false)
                .default(AutogenFunction::CurrentTimestamp),
        );
        t.add_column("title", types::text().nullable(false));
        t.add_column("description", types::text().nullable(false));
        t.add_column("video_url", types::text().nullable(true));
        t.add_column("user_id", types::uuid().nullable(false));

        t.add_index(
            "videos_user_id_created_at_index",
            types::index(["user_id", "created_at"]),
        );
    });

    m.make::<Pg>().to_string()
}

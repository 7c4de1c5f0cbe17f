use crate::filter::{EntityView, FilterSpec};

pub fn sets() -> EntityView {
    EntityView::new(
        "sets",
        "ls.*, lt.name AS theme_name",
        "lego_sets ls LEFT JOIN lego_themes lt ON ls.theme_id = lt.id",
        "ls.year desc, ls.set_num",
    )
    .filter(FilterSpec::contains("search", &["ls.name", "ls.set_num"]))
    .filter(FilterSpec::exact("theme", "lt.name"))
    .filter(FilterSpec::exact_integer("year", "ls.year"))
}

pub fn parts() -> EntityView {
    EntityView::new(
        "parts",
        "lp.*, lpc.name AS category_name",
        "lego_parts lp JOIN lego_part_categories lpc ON lp.part_cat_id = lpc.id",
        "lp.name, lp.part_num",
    )
    .filter(FilterSpec::contains("search", &["lp.name", "lp.part_num"]))
    .filter(FilterSpec::exact("category", "lpc.name"))
}

pub fn inventory_parts() -> EntityView {
    EntityView::new(
        "inventory_parts",
        "lip.*, lp.name AS part_name, lpc.name AS category_name, \
         lc.name AS color_name, lc.rgb AS color_rgb, li.set_num, li.version",
        "lego_inventory_parts lip \
         JOIN lego_parts lp ON lip.part_num = lp.part_num \
         JOIN lego_part_categories lpc ON lp.part_cat_id = lpc.id \
         JOIN lego_colors lc ON lip.color_id = lc.id \
         JOIN lego_inventories li ON lip.inventory_id = li.id",
        "lip.inventory_id, lp.name, lip.part_num, lip.color_id, lip.is_spare",
    )
    .filter(FilterSpec::contains("search", &["lp.name", "lp.part_num", "lc.name"]))
}

pub fn user_inventory() -> EntityView {
    EntityView::new(
        "user_inventory",
        "ui.*, ls.name AS set_name, ls.year, ls.num_parts, lt.name AS theme_name",
        "user_inventory ui \
         JOIN lego_sets ls ON ui.set_num = ls.set_num \
         LEFT JOIN lego_themes lt ON ls.theme_id = lt.id",
        "ui.date_acquired desc nulls last, ui.id desc",
    )
    .filter(FilterSpec::contains("search", &["ls.name", "ui.set_num"]))
    .filter(FilterSpec::exact("theme", "lt.name"))
    .filter(FilterSpec::exact("build_status", "ui.build_status"))
}

pub fn colors() -> EntityView {
    EntityView::new(
        "colors",
        "lc.*, COUNT(lip.color_id) AS usage_count",
        "lego_colors lc LEFT JOIN lego_inventory_parts lip ON lc.id = lip.color_id",
        "usage_count desc, lc.name, lc.id",
    )
    .group_by("lc.id, lc.name, lc.rgb, lc.is_trans")
    .filter(FilterSpec::contains("search", &["lc.name"]))
}

/// Themes ranked by how many sets they hold.
pub fn popular_themes() -> EntityView {
    EntityView::new(
        "popular_themes",
        "lt.id, lt.name, COUNT(*) AS set_count",
        "lego_sets ls JOIN lego_themes lt ON ls.theme_id = lt.id",
        "set_count desc, lt.name, lt.id",
    )
    .group_by("lt.id, lt.name")
    .filter(FilterSpec::contains("search", &["lt.name"]))
}

pub fn themes() -> EntityView {
    EntityView::new("themes", "lt.id, lt.name, lt.parent_id", "lego_themes lt", "lt.name, lt.id")
        .filter(FilterSpec::contains("search", &["lt.name"]))
}

pub fn part_categories() -> EntityView {
    EntityView::new(
        "part_categories",
        "lpc.id, lpc.name",
        "lego_part_categories lpc",
        "lpc.name, lpc.id",
    )
    .filter(FilterSpec::contains("search", &["lpc.name"]))
}

/// Dashboard totals, one row.
pub const SUMMARY_QUERY: &str = "SELECT \
    (SELECT COUNT(*) FROM lego_sets) AS total_sets, \
    (SELECT COUNT(*) FROM user_inventory) AS user_sets, \
    (SELECT COUNT(*) FROM lego_parts) AS total_parts, \
    (SELECT COUNT(*) FROM lego_inventory_parts) AS total_inventory_parts, \
    (SELECT COUNT(DISTINCT color_id) FROM lego_inventory_parts) AS total_colors, \
    (SELECT COUNT(*) FROM lego_themes) AS total_themes";

pub const DIAGNOSTICS_QUERY: &str = "SELECT \
    version() AS server_version, \
    current_user::text AS user_name, \
    current_database()::text AS database_name, \
    (SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public') AS public_tables";

//! Read-only commands: products, categories, runs.

use catsync_core::{
    CategoryNode, Pagination, ProductFilter, ProductSort, ProductTypeId, SortDirection,
};
use catsync_db::PgCatalogReader;
use catsync_sync::CatalogQueries;
use sqlx::PgPool;

use crate::ProductArgs;

pub(crate) async fn list_products(pool: &PgPool, args: &ProductArgs) -> anyhow::Result<()> {
    let queries = CatalogQueries::new(PgCatalogReader::new(pool.clone()));
    let filter = ProductFilter {
        search: args.search.clone(),
        category_id: args.category,
        include_subcategories: args.subcategories,
        min_stock: args.min_stock,
        product_type: args.product_type,
    };
    let sort = ProductSort {
        field: args.sort,
        direction: if args.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        },
    };

    let page = queries
        .product_page(
            &filter,
            Pagination::new(args.page, args.page_size),
            sort,
            args.price_type(),
        )
        .await?;

    for row in &page.items {
        println!("{row}");
    }
    println!(
        "page {} of {} ({} products)",
        page.info.current_page, page.info.total_pages, page.info.total
    );
    Ok(())
}

pub(crate) async fn show_categories(
    pool: &PgPool,
    product_type: Option<ProductTypeId>,
    subtree: Option<i64>,
    json: bool,
) -> anyhow::Result<()> {
    let queries = CatalogQueries::new(PgCatalogReader::new(pool.clone()));
    let nodes = match subtree {
        Some(id) => {
            let node = queries
                .category_subtree(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("category {id} not found"))?;
            vec![node]
        }
        None => queries.category_tree(product_type).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else {
        print!("{}", outline(&nodes));
    }
    Ok(())
}

fn outline(nodes: &[CategoryNode]) -> String {
    fn walk(nodes: &[CategoryNode], depth: usize, out: &mut String) {
        for node in nodes {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!("{} (#{}, {})\n", node.name, node.id, node.slug));
            walk(&node.children, depth + 1, out);
        }
    }
    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}

pub(crate) async fn show_runs(
    pool: &PgPool,
    product_type: Option<ProductTypeId>,
    limit: i64,
) -> anyhow::Result<()> {
    let runs = catsync_db::list_sync_runs(pool, product_type, limit.max(1)).await?;
    if runs.is_empty() {
        println!("no sync runs recorded");
        return Ok(());
    }

    for run in &runs {
        let when = run
            .started_at
            .unwrap_or(run.created_at)
            .format("%Y-%m-%d %H:%M:%S");
        print!(
            "{when}  type={} {:<9} {:<9} cat +{}/~{}/-{} prod +{}/~{}/-{}",
            run.product_type,
            run.trigger_source,
            run.status,
            run.categories_created,
            run.categories_updated,
            run.categories_deleted,
            run.products_created,
            run.products_updated,
            run.products_deleted,
        );
        if let Some(kind) = &run.error_kind {
            print!("  {kind}: {}", run.error_message.as_deref().unwrap_or(""));
        }
        println!();
    }
    Ok(())
}

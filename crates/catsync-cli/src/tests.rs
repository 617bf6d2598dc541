use super::*;

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["catsync-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Migrate));
}

#[test]
fn subcommand_is_required() {
    assert!(Cli::try_parse_from(["catsync-cli"]).is_err());
}

#[test]
fn import_requires_product_type() {
    assert!(Cli::try_parse_from(["catsync-cli", "import"]).is_err());
}

#[test]
fn import_with_file_and_forced_format() {
    let cli = Cli::try_parse_from([
        "catsync-cli",
        "import",
        "--product-type",
        "2",
        "--file",
        "doors.xml",
        "--format",
        "xml",
    ])
    .unwrap();
    let Commands::Import(args) = cli.command else {
        panic!("expected import");
    };
    assert_eq!(args.product_type.get(), 2);
    assert_eq!(args.file, Some(PathBuf::from("doors.xml")));
    assert_eq!(args.format, Some(FormatArg::Xml));
}

#[test]
fn file_and_url_are_mutually_exclusive() {
    let result = Cli::try_parse_from([
        "catsync-cli",
        "plan",
        "--product-type",
        "1",
        "--file",
        "a.xml",
        "--url",
        "https://erp.example/a.xml",
    ]);
    assert!(result.is_err());
}

#[test]
fn non_positive_product_type_is_rejected() {
    assert!(Cli::try_parse_from(["catsync-cli", "plan", "--product-type", "0"]).is_err());
}

#[test]
fn products_defaults() {
    let cli = Cli::try_parse_from(["catsync-cli", "products"]).unwrap();
    let Commands::Products(args) = cli.command else {
        panic!("expected products");
    };
    assert_eq!(args.page, 1);
    assert_eq!(args.page_size, 12);
    assert_eq!(args.sort, SortField::Name);
    assert!(!args.desc);
    assert_eq!(args.price_type(), PriceTypeCode::new(1));
}

#[test]
fn products_sort_by_price_descending() {
    let cli = Cli::try_parse_from([
        "catsync-cli",
        "products",
        "--sort",
        "price",
        "--desc",
        "--category",
        "7",
        "--subcategories",
    ])
    .unwrap();
    let Commands::Products(args) = cli.command else {
        panic!("expected products");
    };
    assert_eq!(args.sort, SortField::Price);
    assert!(args.desc);
    assert_eq!(args.category, Some(7));
    assert!(args.subcategories);
}

#[test]
fn subcategories_needs_a_category() {
    assert!(Cli::try_parse_from(["catsync-cli", "products", "--subcategories"]).is_err());
}

#[test]
fn categories_subtree_as_json() {
    let cli =
        Cli::try_parse_from(["catsync-cli", "categories", "--subtree", "42", "--json"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Categories {
            subtree: Some(42),
            json: true,
            product_type: None
        }
    ));
}

#[test]
fn runs_limit_defaults_to_twenty() {
    let cli = Cli::try_parse_from(["catsync-cli", "runs"]).unwrap();
    assert!(matches!(cli.command, Commands::Runs { limit: 20, .. }));
}

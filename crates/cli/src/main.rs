//! Toy Store CLI - a shopper session on the command line.
//!
//! # Usage
//!
//! ```bash
//! # Browse and fill the cart
//! toy-store catalog list --category dolls --sort price-low
//! toy-store cart add krusty-doll -q 2
//! toy-store cart show
//!
//! # Sign in and check out
//! toy-store auth sign-up homer@springfield.net donuts4ever
//! toy-store checkout Homer Simpson homer@springfield.net "742 Evergreen Terrace" \
//!     Springfield OR 97403 --card-number 4111111111111111 --card-expiry 12/29 --card-cvv 123
//!
//! # Review and manage orders
//! toy-store orders list
//! toy-store orders status order-0a1b2c shipped
//! ```
//!
//! # Commands
//!
//! - `catalog` - List and inspect products
//! - `cart` - Add, remove and change cart lines
//! - `favorites` - Toggle and list favorite products
//! - `auth` - Sign up, sign in and sign out
//! - `checkout` - Place an order for the cart
//! - `orders` - List orders and change their status
//!
//! State lives under `TOY_STORE_DATA_DIR` and survives between invocations.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toy_store_core::{IdempotencyKey, OrderId, OrderStatus, ProductId, ShippingAddress};
use toy_store_storefront::config::StorefrontConfig;
use toy_store_storefront::error::AppError;
use toy_store_storefront::services::checkout::{CheckoutForm, PaymentDetails};
use toy_store_storefront::state::AppState;

mod commands;

use commands::CommandError;
use commands::catalog::{Catalog, ListFilter, SortOrder};

/// How long to wait for analytics deliveries before exiting.
const ANALYTICS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "toy-store")]
#[command(author, version, about = "Toy store shopper session")]
struct Cli {
    /// Product catalog JSON (defaults to the bundled catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage favorite products
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Sign in and out
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Place an order for everything in the cart
    Checkout(CheckoutArgs),
    /// Review placed orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List products, optionally filtered and sorted
    List(ListArgs),
    /// Show one product in detail
    Show {
        /// Product ID
        product: ProductId,
    },
}

#[derive(Args)]
struct ListArgs {
    /// Match name, description or category
    #[arg(long)]
    search: Option<String>,

    /// Only this category ("all" for every category)
    #[arg(long)]
    category: Option<String>,

    /// Lowest price to include
    #[arg(long)]
    min_price: Option<Decimal>,

    /// Highest price to include
    #[arg(long)]
    max_price: Option<Decimal>,

    #[arg(long, value_enum, default_value_t)]
    sort: SortOrder,
}

impl ListArgs {
    fn into_filter(self) -> ListFilter {
        ListFilter {
            search: self.search,
            category: self.category,
            min_price: self.min_price,
            max_price: self.max_price,
            sort: self.sort,
        }
    }
}

#[derive(Subcommand)]
enum CartAction {
    /// Add a product to the cart
    Add {
        /// Product ID
        product: ProductId,

        /// How many to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove {
        /// Product ID
        product: ProductId,
    },
    /// Set the quantity of a cart line (0 or less removes it)
    Set {
        /// Product ID
        product: ProductId,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Empty the cart and start a new one
    Clear,
    /// Show the cart and the order summary
    Show,
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// Add a product to favorites, or remove it if already there
    Toggle {
        /// Product ID
        product: ProductId,
    },
    /// List favorite products
    List,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Create an email/password account and sign in
    SignUp { email: String, password: String },
    /// Sign in with email and password
    SignIn { email: String, password: String },
    /// Sign in with Google
    Google,
    /// Sign out
    SignOut,
    /// Show who is signed in
    Whoami,
}

#[derive(Args)]
struct CheckoutArgs {
    first_name: String,
    last_name: String,
    email: String,
    address: String,
    city: String,
    state: String,
    zip_code: String,

    /// Pay with PayPal instead of a card
    #[arg(long, conflicts_with_all = ["card_number", "card_expiry", "card_cvv", "card_name"])]
    paypal: bool,

    /// Card number
    #[arg(long, default_value = "")]
    card_number: String,

    /// Card expiry (MM/YY)
    #[arg(long, default_value = "")]
    card_expiry: String,

    /// Card security code
    #[arg(long, default_value = "")]
    card_cvv: String,

    /// Name on the card
    #[arg(long, default_value = "")]
    card_name: String,

    /// Retrying with the same key returns the original order
    #[arg(long)]
    idempotency_key: Option<IdempotencyKey>,
}

impl CheckoutArgs {
    fn into_form(self) -> CheckoutForm {
        let payment = if self.paypal {
            PaymentDetails::PayPal
        } else {
            PaymentDetails::Card {
                number: self.card_number,
                expiry: self.card_expiry,
                cvv: self.card_cvv,
                name: self.card_name,
            }
        };

        CheckoutForm {
            shipping: ShippingAddress {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                address: self.address,
                city: self.city,
                state: self.state,
                zip_code: self.zip_code,
            },
            payment,
        }
    }
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List your orders, newest last
    List,
    /// Show one order
    Show {
        /// Order ID
        order: OrderId,
    },
    /// Change an order's status
    Status {
        /// Order ID
        order: OrderId,

        /// New status (pending, processing, shipped, delivered, cancelled)
        status: OrderStatus,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toy_store_storefront=warn,toy_store_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be up before the tracing layer forwards to it
    let sentry_guard = init_sentry(&config);
    init_tracing();

    let code = match run(cli, config).await {
        Ok(output) => {
            emit(&output);
            0
        }
        Err(e) => {
            tracing::error!("{}", e.into_message());
            1
        }
    };

    drop(sentry_guard);
    std::process::exit(code);
}

#[allow(clippy::print_stdout)]
fn emit(output: &str) {
    if !output.is_empty() {
        println!("{output}");
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<String, CommandError> {
    let catalog = match &cli.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };

    let state = AppState::from_config(config).map_err(AppError::from)?;
    state.auth_service().sync_session();

    let output = dispatch(cli.command, &state, &catalog).await;

    let failures = state.persistence_failures();
    if failures > 0 {
        tracing::warn!(failures, "Some changes could not be saved");
    }
    state.flush_analytics(ANALYTICS_FLUSH_TIMEOUT).await;

    output
}

async fn dispatch(
    command: Commands,
    state: &AppState,
    catalog: &Catalog,
) -> Result<String, CommandError> {
    match command {
        Commands::Catalog { action } => match action {
            CatalogAction::List(args) => Ok(commands::catalog::list(
                state,
                catalog,
                &args.into_filter(),
            )),
            CatalogAction::Show { product } => commands::catalog::show(state, catalog, &product),
        },
        Commands::Cart { action } => match action {
            CartAction::Add { product, quantity } => {
                commands::cart::add(state, catalog, &product, quantity)
            }
            CartAction::Remove { product } => Ok(commands::cart::remove(state, &product)),
            CartAction::Set { product, quantity } => {
                Ok(commands::cart::set(state, &product, quantity))
            }
            CartAction::Clear => Ok(commands::cart::clear(state)),
            CartAction::Show => Ok(commands::cart::show(state)),
        },
        Commands::Favorites { action } => match action {
            FavoritesAction::Toggle { product } => {
                commands::favorites::toggle(state, catalog, &product)
            }
            FavoritesAction::List => Ok(commands::favorites::list(state, catalog)),
        },
        Commands::Auth { action } => match action {
            AuthAction::SignUp { email, password } => {
                commands::auth::sign_up(state, &email, &password).await
            }
            AuthAction::SignIn { email, password } => {
                commands::auth::sign_in(state, &email, &password).await
            }
            AuthAction::Google => commands::auth::google(state).await,
            AuthAction::SignOut => commands::auth::sign_out(state).await,
            AuthAction::Whoami => Ok(commands::auth::whoami(state)),
        },
        Commands::Checkout(args) => {
            let key = args.idempotency_key.clone();
            commands::checkout::place_order(state, args.into_form(), key).await
        }
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::orders::list(state),
            OrdersAction::Show { order } => commands::orders::show(state, &order),
            OrdersAction::Status { order, status } => {
                commands::orders::update_status(state, &order, status)
            }
        },
    }
}

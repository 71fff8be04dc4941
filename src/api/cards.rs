use askama::Template;
use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::{enter_view, AppState, View};
use crate::error::{AppError, Result};
use crate::models::{CardProfile, Transaction};
use crate::services::DataSource;

/// Transactions shown on the card view
const RECENT_TRANSACTIONS: usize = 10;

#[derive(Template)]
#[template(path = "cards/details.html")]
struct CardDetailsTemplate {
    card: CardProfile,
    transactions: Vec<Transaction>,
    total_transactions: usize,
    reveal: bool,
}

#[derive(Debug, Deserialize)]
pub struct CardDetailsQuery {
    pub reveal: Option<String>,
}

impl CardDetailsQuery {
    fn reveal(&self) -> bool {
        matches!(self.reveal.as_deref(), Some("1" | "true" | "yes"))
    }
}

async fn home() -> Redirect {
    Redirect::to("/cc-details")
}

/// Card profile plus the most recent transactions
async fn card_details(
    State(state): State<AppState>,
    Query(query): Query<CardDetailsQuery>,
    session: Session,
) -> Result<CardDetailsTemplate> {
    enter_view(&state, &session, View::CardDetails).await?;

    let (card, page) = tokio::try_join!(
        state.data_source.get_card_details(),
        state
            .data_source
            .get_transaction_history(RECENT_TRANSACTIONS, 0),
    )
    .map_err(|e| AppError::retry(e, "/cc-details"))?;

    if !card.is_well_formed() {
        tracing::warn!(holder = %card.card_holder_name, "Card profile has unexpected number or CVV format");
    }

    Ok(CardDetailsTemplate {
        card,
        total_transactions: page.total,
        transactions: page.transactions,
        reveal: query.reveal(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/cc-details", get(card_details))
}

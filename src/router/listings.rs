//! Listings-related HTTP API.

use axum::Json;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::guard;
use crate::identity::{Identity, IdentityId, Role};
use crate::listing::{
    Category, Decision, FavoriteToggle, Listing, ListingContent, ListingDraft,
    ListingFilter, ListingId, ListingPatch, ModerationEvent, ModerationStatus,
};
use crate::router::{Caller, Valid, listing_id};

/// Public representation of a listing.
///
/// Favoriting identities are never disclosed, only their count. The
/// moderation trail is shown to the owner and administrators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    id: ListingId,
    owner: IdentityId,
    #[serde(flatten)]
    content: ListingContent,
    primary_image: Option<String>,
    status: ModerationStatus,
    views: u64,
    favorites: usize,
    favorited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    moderation: Option<Vec<ModerationEvent>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ListingView {
    fn new(listing: Listing, viewer: Option<&Identity>) -> Self {
        let privileged = viewer.is_some_and(|viewer| {
            viewer.id == listing.owner
                || guard::authorize(viewer, &[Role::Admin])
        });

        Self {
            primary_image: listing.primary_image().map(str::to_owned),
            favorited: viewer
                .is_some_and(|viewer| listing.is_favorited_by(&viewer.id)),
            favorites: listing.favorites.len(),
            moderation: privileged.then_some(listing.moderation),
            id: listing.id,
            owner: listing.owner,
            content: listing.content,
            status: listing.status,
            views: listing.views,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
        }
    }

    fn many(listings: Vec<Listing>, viewer: Option<&Identity>) -> Vec<Self> {
        listings
            .into_iter()
            .map(|listing| ListingView::new(listing, viewer))
            .collect()
    }
}

/// Catalogue query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    category: Option<String>,
    city: Option<String>,
    min_price: Option<u64>,
    max_price: Option<u64>,
    owner: Option<IdentityId>,
}

impl SearchQuery {
    fn into_filter(self) -> Result<ListingFilter> {
        Ok(ListingFilter {
            category: self
                .category
                .as_deref()
                .map(Category::parse_field)
                .transpose()?,
            city: self.city,
            min_price: self.min_price,
            max_price: self.max_price,
            owner: self.owner,
            ..Default::default()
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ModerationBody {
    pub decision: Decision,
    #[validate(length(
        max = 500,
        message = "Reason must not exceed 500 characters."
    ))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StatusBody {
    pub status: ModerationStatus,
    #[validate(length(
        max = 500,
        message = "Reason must not exceed 500 characters."
    ))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    pub views: u64,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub favorite: FavoriteToggle,
}

async fn create(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Valid(draft): Valid<ListingDraft>,
) -> Result<(StatusCode, Json<ListingView>)> {
    let listing = state.listings.create(&owner, draft).await?;
    Ok((StatusCode::CREATED, Json(ListingView::new(listing, Some(&owner)))))
}

async fn search(
    State(state): State<AppState>,
    viewer: Option<Caller>,
    query: std::result::Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<ListingView>>> {
    let Query(query) = query?;
    let listings = state.listings.search(query.into_filter()?).await?;
    let viewer = viewer.map(|Caller(identity)| identity);

    Ok(Json(ListingView::many(listings, viewer.as_ref())))
}

async fn mine(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Json<Vec<ListingView>>> {
    let listings = state.listings.listings_of(&identity.id).await?;
    Ok(Json(ListingView::many(listings, Some(&identity))))
}

async fn favorites(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Json<Vec<ListingView>>> {
    let listings = state.listings.favorites_of(&identity.id).await?;
    Ok(Json(ListingView::many(listings, Some(&identity))))
}

async fn get_one(
    State(state): State<AppState>,
    viewer: Option<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ListingView>> {
    let viewer = viewer.map(|Caller(identity)| identity);
    let listing = state.listings.get(&listing_id(&id)?, viewer.as_ref()).await?;

    Ok(Json(ListingView::new(listing, viewer.as_ref())))
}

async fn update(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    Valid(patch): Valid<ListingPatch>,
) -> Result<Json<ListingView>> {
    let listing = state
        .listings
        .update(&identity, &listing_id(&id)?, patch)
        .await?;

    Ok(Json(ListingView::new(listing, Some(&identity))))
}

async fn remove(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.listings.delete(&identity, &listing_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Views are counted for anyone who can see the listing, without
/// deduplication.
async fn view(
    State(state): State<AppState>,
    viewer: Option<Caller>,
    Path(id): Path<String>,
) -> Result<Json<ViewsResponse>> {
    let viewer = viewer.map(|Caller(identity)| identity);
    let views = state
        .listings
        .increment_view(&listing_id(&id)?, viewer.as_ref())
        .await?;
    Ok(Json(ViewsResponse { views }))
}

async fn favorite(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
) -> Result<Json<FavoriteResponse>> {
    let favorite = state
        .listings
        .toggle_favorite(&identity, &listing_id(&id)?)
        .await?;

    Ok(Json(FavoriteResponse { favorite }))
}

async fn moderate(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
    Valid(body): Valid<ModerationBody>,
) -> Result<Json<ListingView>> {
    let listing = state
        .listings
        .moderate(&admin, &listing_id(&id)?, body.decision, body.reason)
        .await?;

    Ok(Json(ListingView::new(listing, Some(&admin))))
}

async fn set_status(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
    Valid(body): Valid<StatusBody>,
) -> Result<Json<ListingView>> {
    let listing = state
        .listings
        .override_status(&admin, &listing_id(&id)?, body.status, body.reason)
        .await?;

    Ok(Json(ListingView::new(listing, Some(&admin))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(search))
        .route("/mine", get(mine))
        .route("/favorites", get(favorites))
        .route("/{id}", get(get_one).patch(update).delete(remove))
        .route("/{id}/views", post(view))
        .route("/{id}/favorite", post(favorite))
        // Administration.
        .route("/{id}/moderation", post(moderate))
        .route("/{id}/status", put(set_status))
}

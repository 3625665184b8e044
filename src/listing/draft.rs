//! Caller-supplied listing fields.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::listing::{Category, Image, ListingContent, Location, Unit};

/// Image as sent by a seller.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageDraft {
    #[validate(url(message = "Image URL must be a valid URL."))]
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Location as sent by a seller.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LocationDraft {
    #[validate(length(
        min = 1,
        max = 80,
        message = "City is required and must not exceed 80 characters."
    ))]
    pub city: String,
    #[validate(length(
        max = 80,
        message = "District must not exceed 80 characters."
    ))]
    pub district: Option<String>,
}

/// Fields of a new listing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    #[validate(length(
        min = 3,
        max = 120,
        message = "Title must contain between 3 and 120 characters."
    ))]
    pub title: String,
    #[serde(default)]
    #[validate(length(
        max = 5000,
        message = "Description must not exceed 5000 characters."
    ))]
    pub description: String,
    #[validate(range(min = 0, message = "Price must not be negative."))]
    pub price: i64,
    pub category: String,
    #[validate(nested)]
    pub location: LocationDraft,
    #[serde(default)]
    pub stock: u32,
    pub unit: String,
    #[serde(default)]
    #[validate(
        length(max = 10, message = "A listing holds at most 10 images."),
        nested
    )]
    pub images: Vec<ImageDraft>,
}

/// Partial update of a listing. Absent fields are left untouched.
///
/// Moderation status is not part of this payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    #[validate(length(
        min = 3,
        max = 120,
        message = "Title must contain between 3 and 120 characters."
    ))]
    pub title: Option<String>,
    #[validate(length(
        max = 5000,
        message = "Description must not exceed 5000 characters."
    ))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Price must not be negative."))]
    pub price: Option<i64>,
    pub category: Option<String>,
    #[validate(nested)]
    pub location: Option<LocationDraft>,
    pub stock: Option<u32>,
    pub unit: Option<String>,
    #[validate(
        length(max = 10, message = "A listing holds at most 10 images."),
        nested
    )]
    pub images: Option<Vec<ImageDraft>>,
}

/// Validated and typed [`ListingPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub category: Option<Category>,
    pub location: Option<Location>,
    pub stock: Option<u32>,
    pub unit: Option<Unit>,
    pub images: Option<Vec<Image>>,
}

impl ContentUpdate {
    /// Whether applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == ContentUpdate::default()
    }

    /// Overwrite the fields present in this update.
    pub fn apply(self, content: &mut ListingContent) {
        if let Some(title) = self.title {
            content.title = title;
        }
        if let Some(description) = self.description {
            content.description = description;
        }
        if let Some(price) = self.price {
            content.price = price;
        }
        if let Some(category) = self.category {
            content.category = category;
        }
        if let Some(location) = self.location {
            content.location = location;
        }
        if let Some(stock) = self.stock {
            content.stock = stock;
        }
        if let Some(unit) = self.unit {
            content.unit = unit;
        }
        if let Some(images) = self.images {
            content.images = images;
        }
    }
}

fn price(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        ServerError::field("price", "range", "Price must not be negative.")
    })
}

impl From<LocationDraft> for Location {
    fn from(draft: LocationDraft) -> Self {
        Location {
            city: draft.city.trim().to_owned(),
            district: draft
                .district
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
        }
    }
}

impl From<ImageDraft> for Image {
    fn from(draft: ImageDraft) -> Self {
        Image {
            url: draft.url,
            is_primary: draft.is_primary,
        }
    }
}

fn check_city(location: &Location) -> Result<()> {
    if location.city.is_empty() {
        return Err(ServerError::field(
            "city",
            "length",
            "City is required and must not exceed 80 characters.",
        ));
    }
    Ok(())
}

impl ListingDraft {
    /// Validate every field and convert into typed content.
    pub fn into_content(mut self) -> Result<ListingContent> {
        // Length bounds apply to the stored, trimmed title.
        self.title = self.title.trim().to_owned();
        self.validate()?;

        let location = Location::from(self.location);
        check_city(&location)?;

        Ok(ListingContent {
            title: self.title,
            description: self.description,
            price: price(self.price)?,
            category: Category::parse_field(&self.category)?,
            location,
            stock: self.stock,
            unit: Unit::parse_field(&self.unit)?,
            images: self.images.into_iter().map(Image::from).collect(),
        })
    }
}

impl ListingPatch {
    /// Validate present fields and convert into a typed update.
    pub fn into_update(mut self) -> Result<ContentUpdate> {
        self.title = self.title.map(|t| t.trim().to_owned());
        self.validate()?;

        let location = self.location.map(Location::from);
        if let Some(location) = &location {
            check_city(location)?;
        }

        Ok(ContentUpdate {
            title: self.title,
            description: self.description,
            price: self.price.map(price).transpose()?,
            category: self
                .category
                .as_deref()
                .map(Category::parse_field)
                .transpose()?,
            location,
            stock: self.stock,
            unit: self.unit.as_deref().map(Unit::parse_field).transpose()?,
            images: self
                .images
                .map(|images| images.into_iter().map(Image::from).collect()),
        })
    }
}

//! Column names of the listings dataset and of the columns derived from it.

pub const ID: &str = "id";
pub const NAME: &str = "name";
pub const HOST_ID: &str = "host_id";
pub const HOST_NAME: &str = "host_name";
pub const NEIGHBOURHOOD_GROUP: &str = "neighbourhood_group";
pub const NEIGHBOURHOOD: &str = "neighbourhood";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const ROOM_TYPE: &str = "room_type";
pub const PRICE: &str = "price";
pub const MINIMUM_NIGHTS: &str = "minimum_nights";
pub const NUMBER_OF_REVIEWS: &str = "number_of_reviews";
pub const LAST_REVIEW: &str = "last_review";
pub const REVIEWS_PER_MONTH: &str = "reviews_per_month";
pub const CALCULATED_HOST_LISTINGS_COUNT: &str = "calculated_host_listings_count";
pub const AVAILABILITY_365: &str = "availability_365";

/// Header of the source file, in file order.
pub const RAW_COLUMNS: [&str; 16] = [
    ID,
    NAME,
    HOST_ID,
    HOST_NAME,
    NEIGHBOURHOOD_GROUP,
    NEIGHBOURHOOD,
    LATITUDE,
    LONGITUDE,
    ROOM_TYPE,
    PRICE,
    MINIMUM_NIGHTS,
    NUMBER_OF_REVIEWS,
    LAST_REVIEW,
    REVIEWS_PER_MONTH,
    CALCULATED_HOST_LISTINGS_COUNT,
    AVAILABILITY_365,
];

// Derived by the transform step
pub const LAST_REVIEW_DATE: &str = "last_review_date";
pub const LAST_REVIEW_TIME: &str = "last_review_time";
pub const AVG_PRICE: &str = "avg_price";
pub const MISSING_REVIEWS_PER_MONTH: &str = "missing_reviews_per_month";

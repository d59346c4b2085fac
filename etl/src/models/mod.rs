mod listing;

pub use listing::{
    AVG_PRICE, AVAILABILITY_365, CALCULATED_HOST_LISTINGS_COUNT, HOST_ID, HOST_NAME, ID,
    LAST_REVIEW, LAST_REVIEW_DATE, LAST_REVIEW_TIME, LATITUDE, LONGITUDE, MINIMUM_NIGHTS,
    MISSING_REVIEWS_PER_MONTH, NAME, NEIGHBOURHOOD, NEIGHBOURHOOD_GROUP, NUMBER_OF_REVIEWS, PRICE,
    RAW_COLUMNS, REVIEWS_PER_MONTH, ROOM_TYPE,
};

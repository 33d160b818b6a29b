use axum::extract::FromRef;

use crate::{
    api::v1::{
        auth::UserCollection, booking::BookingCollection, review::ReviewCollection,
        token::JwtState, tour::TourCollection,
    },
    email::Mailer,
    migrate::MigrationCollection,
    razorpay::RazorpayState,
};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub argon: argon2::Argon2<'static>,
    pub jwt_state: JwtState,

    pub mailer: Mailer,
    pub razorpay: RazorpayState,

    pub mongo_client: mongodb::Client,
    pub user_collection: UserCollection,
    pub tour_collection: TourCollection,
    pub review_collection: ReviewCollection,
    pub booking_collection: BookingCollection,
    pub migrate_collection: MigrationCollection,
}

impl AppState {
    pub async fn new(
        mongo_url: &str,
        database_name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let argon = argon2::Argon2::default();
        let jwt_state = JwtState::new_from_env();

        let mailer = Mailer::new_from_env();
        let razorpay = RazorpayState::new_from_env();

        let mongo_client_opt = mongodb::options::ClientOptions::parse(mongo_url).await?;
        let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;

        let db = mongo_client.database(database_name);
        Ok(Self {
            argon,
            jwt_state,

            mailer,
            razorpay,

            mongo_client,
            user_collection: UserCollection(db.collection("users").into()),
            tour_collection: TourCollection(db.collection("tours").into()),
            review_collection: ReviewCollection(db.collection("reviews").into()),
            booking_collection: BookingCollection(db.collection("bookings").into()),
            migrate_collection: MigrationCollection(db.collection("migrations").into()),
        })
    }

    pub async fn new_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mongodb_url = &std::env::var("MONGODB_URI")
            .expect("Cannot retrieve MONGODB_URI from environment variable.");

        Self::new(mongodb_url, "tourbook").await
    }
}

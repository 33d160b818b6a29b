pub mod auth;
pub mod booking;
pub mod factory;
pub mod query;
pub mod review;
pub mod token;
pub mod tour;
pub mod user;

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use bson::oid::ObjectId;
    use time::OffsetDateTime;

    use crate::{
        api::v1::{
            auth::{CurrentUser, UserCollection, UserModel, UserRole},
            booking::BookingCollection,
            review::ReviewCollection,
            token::JwtState,
            tour::{Difficulty, TourCollection, TourModel},
        },
        app::AppState,
        email::Mailer,
        migrate::MigrationCollection,
        razorpay::RazorpayState,
    };

    #[allow(dead_code)]
    pub struct Bootstrap {
        user_model: UserModel,
        user_password: String,
        pub app_state: AppState,

        track_cleanup: Arc<Cleanup>,
    }

    #[allow(dead_code)]
    pub struct Cleanup {
        database_name: String,
        app_state: AppState,
    }

    impl Drop for Cleanup {
        fn drop(&mut self) {
            // per-test databases are named tourbook-test-{oid}; dropping one
            // here would need a runtime inside Drop, so stale ones are
            // cleaned out of band
        }
    }

    impl Bootstrap {
        pub fn user_collection(&self) -> State<UserCollection> {
            State(self.app_state.user_collection.clone())
        }

        pub fn tour_collection(&self) -> State<TourCollection> {
            State(self.app_state.tour_collection.clone())
        }

        pub fn review_collection(&self) -> State<ReviewCollection> {
            State(self.app_state.review_collection.clone())
        }

        pub fn booking_collection(&self) -> State<BookingCollection> {
            State(self.app_state.booking_collection.clone())
        }

        pub fn argon(&self) -> State<argon2::Argon2<'static>> {
            State(self.app_state.argon.clone())
        }

        pub fn jwt_state(&self) -> State<JwtState> {
            State(self.app_state.jwt_state.clone())
        }

        pub fn mailer(&self) -> State<Mailer> {
            State(self.app_state.mailer.clone())
        }

        pub fn razorpay(&self) -> State<RazorpayState> {
            State(self.app_state.razorpay.clone())
        }

        pub fn user_id(&self) -> ObjectId {
            self.user_model.id
        }

        pub fn user_password(&self) -> String {
            self.user_password.clone()
        }

        pub fn current_user(&self) -> CurrentUser {
            CurrentUser(self.user_model.clone())
        }

        pub fn user_token(&self) -> String {
            super::token::sign_token(&self.app_state.jwt_state, self.user_model.id)
                .unwrap()
                .token
        }

        pub async fn derive(&self, email: &str, password: &str, role: UserRole) -> Bootstrap {
            let user = create_user(&self.app_state, email, password, role).await;

            Bootstrap {
                user_model: user,
                user_password: password.to_string(),
                app_state: self.app_state.clone(),

                track_cleanup: self.track_cleanup.clone(),
            }
        }

        pub async fn seed_tour(&self, name: &str) -> ObjectId {
            let tour = TourModel {
                id: ObjectId::new(),
                name: name.to_string(),
                slug: crate::util::slugify(name),
                duration: 5,
                max_group_size: 25,
                difficulty: Difficulty::Easy,
                ratings_average: 4.5,
                ratings_quantity: 0,
                price: 397.0,
                price_discount: None,
                summary: "summary".to_string(),
                description: None,
                image_cover: "cover.jpg".to_string(),
                images: vec![],
                start_dates: vec![],
                secret_tour: false,
                start_location: None,
                locations: vec![],
                guides: vec![],
                created_at: OffsetDateTime::now_utc().into(),
            };

            self.app_state
                .tour_collection
                .insert_one(&tour, None)
                .await
                .unwrap();

            tour.id
        }
    }

    /// Client handle that never connects; for tests exercising the paths
    /// before any database call.
    pub fn offline_mongo_client() -> mongodb::Client {
        let options = mongodb::options::ClientOptions::builder()
            .hosts(vec![mongodb::options::ServerAddress::Tcp {
                host: "localhost".to_string(),
                port: Some(27017),
            }])
            .build();

        mongodb::Client::with_options(options).unwrap()
    }

    pub fn offline_app_state() -> AppState {
        let mongo_client = offline_mongo_client();
        let db = mongo_client.database("tourbook-offline");

        AppState {
            argon: argon2::Argon2::default(),
            jwt_state: JwtState::new(b"unit-test-secret", 90),

            mailer: Mailer::new(
                "test-api-key".to_string(),
                "noreply@test.com".to_string(),
                "http://localhost:8000".to_string(),
            ),
            razorpay: RazorpayState::new(
                "rzp_test_key".to_string(),
                "test_key_secret".to_string(),
            ),

            mongo_client,
            user_collection: UserCollection(db.collection("users").into()),
            tour_collection: TourCollection(db.collection("tours").into()),
            review_collection: ReviewCollection(db.collection("reviews").into()),
            booking_collection: BookingCollection(db.collection("bookings").into()),
            migrate_collection: MigrationCollection(db.collection("migrations").into()),
        }
    }

    pub fn offline_user(role: UserRole) -> UserModel {
        UserModel {
            id: ObjectId::new(),
            name: "example".to_string(),
            email: "example@example.com".to_string(),
            password: String::new(),
            role,
            active: true,
            photo: None,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: OffsetDateTime::now_utc().into(),
        }
    }

    pub async fn create_user(
        app: &AppState,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> UserModel {
        super::auth::create_user(
            &app.user_collection,
            &app.argon,
            super::auth::CreateUserRequest {
                name: "example".to_string(),
                email: email.to_string(),
                password: password.to_string(),
                password_confirm: password.to_string(),
                role,
            },
        )
        .await
        .unwrap()
    }

    pub async fn bootstrap() -> Bootstrap {
        dotenvy::dotenv().ok();
        let mongodb_url = &std::env::var("MONGODB_URI")
            .expect("Cannot retrieve MONGODB_URI from environment variable.");

        let database_name = format!("tourbook-test-{}", ObjectId::new());

        let mongo_client_opt = mongodb::options::ClientOptions::parse(mongodb_url)
            .await
            .unwrap();
        let mongo_client = mongodb::Client::with_options(mongo_client_opt).unwrap();
        let db = mongo_client.database(&database_name);

        // external services get throwaway credentials; nothing in the test
        // suite sends real mail or real orders
        let app_state = AppState {
            argon: argon2::Argon2::default(),
            jwt_state: JwtState::new(b"unit-test-secret", 90),

            mailer: Mailer::new(
                "test-api-key".to_string(),
                "noreply@test.com".to_string(),
                "http://localhost:8000".to_string(),
            ),
            razorpay: RazorpayState::new(
                "rzp_test_key".to_string(),
                "test_key_secret".to_string(),
            ),

            mongo_client,
            user_collection: UserCollection(db.collection("users").into()),
            tour_collection: TourCollection(db.collection("tours").into()),
            review_collection: ReviewCollection(db.collection("reviews").into()),
            booking_collection: BookingCollection(db.collection("bookings").into()),
            migrate_collection: MigrationCollection(db.collection("migrations").into()),
        };

        let password = "password123";
        let user = create_user(&app_state, "example@example.com", password, UserRole::Admin).await;

        let track_cleanup = Arc::new(Cleanup {
            database_name,
            app_state: app_state.clone(),
        });

        Bootstrap {
            app_state,
            user_model: user,
            user_password: password.to_string(),

            track_cleanup,
        }
    }
}

//! Profile groups attached to the registration form

use std::collections::BTreeMap;
use std::sync::Arc;

use profile_service::clock::SystemClock;
use profile_service::domain::fields::{DisplayConfig, WidgetConfig};
use profile_service::domain::{
    FieldDefinition, FieldKind, FieldValue, FormInput, FormStage, HostForm, ProfileType,
};
use profile_service::error::ProfileError;
use profile_service::services::{ProfileServices, RegistrationOutcome};
use profile_service::storage::MemoryStorage;

const FULLNAME_KEY: &str = "entity_test[profile_fullname][0][value]";

async fn services() -> ProfileServices {
    let services = ProfileServices::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock));

    services
        .registry
        .create(
            ProfileType::new("test", "Test profile")
                .with_weight(0)
                .with_registration(true),
        )
        .await
        .unwrap();
    services
        .schema
        .attach_field(
            FieldDefinition::new("test", "profile_fullname", "Full name", FieldKind::Text)
                .required(true)
                .with_widget(WidgetConfig::new("string_textfield"))
                .with_display(DisplayConfig {
                    formatter: "text_default".to_string(),
                    weight: 0,
                }),
        )
        .await
        .unwrap();

    services
}

fn input(name: &str, fullname: Option<&str>) -> FormInput {
    let mut input = BTreeMap::from([
        ("name".to_string(), name.to_string()),
        ("mail".to_string(), format!("{}@example.com", name)),
    ]);
    if let Some(fullname) = fullname {
        input.insert(FULLNAME_KEY.to_string(), fullname.to_string());
    }
    input
}

mod registration {
    use super::*;

    #[tokio::test]
    async fn required_field_then_success() {
        let services = services().await;

        let rejected = services
            .registration
            .submit(input("jane", None))
            .await
            .unwrap();
        let RegistrationOutcome::Rejected { errors } = rejected else {
            panic!("submission without the required field was accepted");
        };
        assert!(errors
            .iter()
            .any(|e| e.message == "Full name field is required."));
        assert!(services.accounts.find_by_name("jane").await.unwrap().is_none());

        let accepted = services
            .registration
            .submit(input("jane", Some("Jane Doe")))
            .await
            .unwrap();
        let RegistrationOutcome::Registered { account, profiles } = accepted else {
            panic!("valid submission was rejected");
        };
        assert_eq!(account.name, "jane");

        let stored = services
            .profiles
            .load_by_owner_and_type(account.id, "test")
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), profiles[0].id());

        let loaded = services.profiles.load(stored[0].id().unwrap()).await.unwrap();
        assert_eq!(loaded.owner_id(), account.id);
        assert_eq!(
            loaded.field("profile_fullname"),
            &[FieldValue::Text("Jane Doe".to_string())]
        );
    }

    #[tokio::test]
    async fn types_not_offered_at_registration_are_not_attached() {
        let services = services().await;
        services
            .registry
            .create(ProfileType::new("internal", "Internal notes"))
            .await
            .unwrap();

        let form = services.registration.build_form().await.unwrap();
        let namespaces: Vec<&str> = form.groups().iter().map(|g| g.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["entity_test"]);
    }
}

mod adapter {
    use super::*;

    #[tokio::test]
    async fn namespace_collision_is_a_conflict() {
        let services = services().await;
        let profile_type = services.registry.load("test").await.unwrap();

        let mut form = HostForm::new("custom_form");
        services
            .attach
            .attach(&mut form, std::slice::from_ref(&profile_type))
            .await
            .unwrap();
        let before = form.elements().len();

        let err = services
            .attach
            .attach(&mut form, std::slice::from_ref(&profile_type))
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Conflict(_)));
        assert_eq!(form.elements().len(), before);
    }

    #[tokio::test]
    async fn commit_requires_validation_and_runs_once() {
        let services = services().await;
        let account = services
            .accounts
            .create(profile_service::domain::NewAccount::new("jane", "jane@example.com"))
            .await
            .unwrap();
        let profile_type = services.registry.load("test").await.unwrap();

        let mut form = HostForm::new("custom_form");
        services
            .attach
            .attach(&mut form, &[profile_type])
            .await
            .unwrap();
        form.set_input(BTreeMap::from([(
            FULLNAME_KEY.to_string(),
            "Jane Doe".to_string(),
        )]));

        assert!(matches!(
            services.attach.commit(&mut form, account.id).await,
            Err(ProfileError::Validation(_))
        ));

        assert!(services.attach.validate(&mut form).is_valid());
        assert_eq!(form.stage(), FormStage::Validated);

        let profiles = services.attach.commit(&mut form, account.id).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(form.stage(), FormStage::Committed);

        assert!(matches!(
            services.attach.commit(&mut form, account.id).await,
            Err(ProfileError::Conflict(_))
        ));
        assert_eq!(services.profiles.load_by_owner(account.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_for_unknown_owner_creates_nothing() {
        let services = services().await;
        let profile_type = services.registry.load("test").await.unwrap();

        let mut form = HostForm::new("custom_form");
        services
            .attach
            .attach(&mut form, &[profile_type])
            .await
            .unwrap();
        form.set_input(BTreeMap::from([(
            FULLNAME_KEY.to_string(),
            "Jane Doe".to_string(),
        )]));
        assert!(services.attach.validate(&mut form).is_valid());

        assert!(matches!(
            services.attach.commit(&mut form, 4242).await,
            Err(ProfileError::Reference(_))
        ));
        assert!(services.profiles.load_by_owner(4242).await.unwrap().is_empty());
    }
}

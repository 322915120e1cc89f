use docmodel::{
    bson::Bson,
    chrono::{DateTime, Utc},
    prelude::*,
    uuid::Uuid,
};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq, Record)]
struct Leaf {
    label: Option<String>,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(collection = "everything")]
struct Everything {
    #[record(id)]
    id: Option<ObjectId>,
    small: i32,
    large: i64,
    ratio: f64,
    #[record(rename = "txt")]
    text: String,
    flag: bool,
    token: Uuid,
    at: DateTime<Utc>,
    owner: Option<ObjectId>,
    maybe: Option<i64>,
    tags: Vec<String>,
    leaf: Leaf,
    extra: Option<Leaf>,
    leaves: Vec<Leaf>,
}

fn leaf() -> impl Strategy<Value = Leaf> {
    (proptest::option::of("[a-z]{0,8}"), -1.0e9..1.0e9f64)
        .prop_map(|(label, weight)| Leaf { label, weight })
}

fn everything() -> impl Strategy<Value = Everything> {
    (
        (
            proptest::option::of(any::<[u8; 12]>()),
            any::<i32>(),
            any::<i64>(),
            -1.0e12..1.0e12f64,
            ".{0,16}",
            any::<bool>(),
            any::<u128>(),
        ),
        (
            -8_000_000_000_000_i64..8_000_000_000_000_i64,
            proptest::option::of(any::<[u8; 12]>()),
            proptest::option::of(any::<i64>()),
            proptest::collection::vec("[a-z]{1,4}", 0..4),
            leaf(),
            proptest::option::of(leaf()),
            proptest::collection::vec(leaf(), 0..3),
        ),
    )
        .prop_map(
            |((id, small, large, ratio, text, flag, token), (millis, owner, maybe, tags, leaf, extra, leaves))| {
                Everything {
                    id: id.map(ObjectId::from_bytes),
                    small,
                    large,
                    ratio,
                    text,
                    flag,
                    token: Uuid::from_u128(token),
                    at: DateTime::from_timestamp_millis(millis).unwrap(),
                    owner: owner.map(ObjectId::from_bytes),
                    maybe,
                    tags,
                    leaf,
                    extra,
                    leaves,
                }
            },
        )
}

proptest! {
    #[test]
    fn prop_documents_round_trip(record in everything()) {
        let document = record.to_document();

        prop_assert_eq!(Everything::from_document(&document).unwrap(), record.clone());
        prop_assert!(Everything::schema().validate(&document).is_ok());
        prop_assert_eq!(Everything::from_json(record.to_json().unwrap()).unwrap(), record);
    }

    #[test]
    fn prop_absent_values_are_omitted(record in everything()) {
        let document = record.to_document();

        prop_assert_eq!(document.contains_key("_id"), record.id.is_some());
        prop_assert_eq!(document.contains_key("owner"), record.owner.is_some());
        prop_assert_eq!(document.contains_key("maybe"), record.maybe.is_some());
        prop_assert_eq!(document.contains_key("extra"), record.extra.is_some());
        prop_assert!(document.contains_key("txt"));
        prop_assert!(!document.values().any(|value| matches!(value, Bson::Null)));
    }

    #[test]
    fn prop_sorted_finds_are_ordered(values in proptest::collection::vec((0..5_i32, any::<i64>()), 0..40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let found = runtime.block_on(async {
            let store = DocumentStore::new(InMemoryStore::new());
            let collection = store.bind::<Everything>("sorted");
            let f = Everything::fields();

            for (small, large) in &values {
                let mut record = Everything {
                    id: None,
                    small: *small,
                    large: *large,
                    ratio: 0.0,
                    text: String::new(),
                    flag: false,
                    token: Uuid::nil(),
                    at: DateTime::from_timestamp_millis(0).unwrap(),
                    owner: None,
                    maybe: None,
                    tags: Vec::new(),
                    leaf: Leaf { label: None, weight: 0.0 },
                    extra: None,
                    leaves: Vec::new(),
                };
                collection.insert_one(&mut record).await.unwrap();
            }

            collection
                .find_with(Filter::all(), FindOptions::new().sort(f.small.asc()).sort(f.large.desc()))
                .await
                .unwrap()
                .try_collect_all()
                .await
                .unwrap()
        });

        prop_assert_eq!(found.len(), values.len());
        for pair in found.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.small < b.small || (a.small == b.small && a.large >= b.large));
        }
    }
}

//! Message immutability and mention routing.

use crate::prelude::{id, world};
use foreman_core::{
    ChannelData, DependencyKind, ElementData, MessageData, NewElement, StoreError,
};
use foreman_storage::InboxSource;

#[test]
fn mention_routing_and_message_immutability() {
    let w = world();
    w.entity("ann", "ann");
    w.entity("bee", "bee");
    w.store
        .create(
            NewElement::new(
                ElementData::Channel(ChannelData::group(
                    "grp",
                    vec!["ann".into(), "bee".into()],
                )),
                "spec",
            )
            .with_id("grp"),
        )
        .unwrap();
    w.document("d1", "Hi @bee");

    let message = w
        .store
        .create(
            NewElement::new(
                ElementData::Message(MessageData::new(id("grp"), "ann", id("d1"))),
                "ann",
            )
            .with_id("msg-1"),
        )
        .unwrap();

    // bee has an inbox item sourced from the mention
    let inbox = w.store.inbox_for("bee", false, None).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, InboxSource::Mention);
    assert_eq!(inbox[0].message_id, message.id);

    // The mentions dependency is the audit trail
    let deps = w
        .store
        .dependencies_of(&message.id, Some(&[DependencyKind::Mentions]))
        .unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].blocker.as_str(), "bee");

    // The message can be neither updated nor deleted
    let update_err = w
        .store
        .update(
            &message.id,
            [("sender".to_string(), serde_json::json!("bee"))]
                .into_iter()
                .collect(),
            Default::default(),
        )
        .unwrap_err();
    assert!(matches!(update_err, StoreError::Constraint(_)));

    let delete_err = w.store.delete(&message.id, Default::default()).unwrap_err();
    assert!(matches!(delete_err, StoreError::Constraint(_)));
}

#[test]
fn direct_channels_are_find_or_create() {
    let w = world();
    w.entity("ann", "ann");
    w.entity("bee", "bee");

    let first = w
        .store
        .find_or_create_direct_channel("ann", "bee", "ann")
        .unwrap();
    let second = w
        .store
        .find_or_create_direct_channel("bee", "ann", "bee")
        .unwrap();
    assert_eq!(first.id, second.id);

    // Direct messages notify the other member
    w.document("d1", "psst");
    w.store
        .create(NewElement::new(
            ElementData::Message(MessageData::new(first.id.clone(), "ann", id("d1"))),
            "ann",
        ))
        .unwrap();
    let inbox = w.store.inbox_for("bee", false, None).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, InboxSource::Direct);
    assert!(w.store.inbox_for("ann", false, None).unwrap().is_empty());
}

use modelgraph::validations::Validator;
use modelgraph::{AttributeReflection, Model, ModelClass, ModelError, Type, Value};
use serde_json::json;
use std::rc::Rc;

fn book_class() -> Rc<ModelClass> {
    ModelClass::builder("Book")
        .attribute(AttributeReflection::new("title", Type::String))
        .validates("title", Validator::Presence)
        .build()
        .unwrap()
}

fn shelf_class() -> Rc<ModelClass> {
    ModelClass::builder("Shelf")
        .embeds_many("books", &book_class())
        .define_save(|_| Ok(true))
        .build()
        .unwrap()
}

fn stored_titles(shelf: &Model) -> Vec<Value> {
    shelf
        .read_attribute("books")
        .unwrap()
        .into_array()
        .unwrap_or_default()
        .into_iter()
        .map(|doc| doc.as_dict().and_then(|d| d.get("title").cloned()).unwrap_or_default())
        .collect()
}

fn target_titles(shelf: &Model) -> Vec<Value> {
    shelf
        .association("books")
        .unwrap()
        .target_models()
        .unwrap()
        .iter()
        .map(|book| book.get("title").unwrap())
        .collect()
}

fn titles(names: &[&str]) -> Vec<Value> {
    names.iter().map(|name| Value::from(*name)).collect()
}

#[test]
fn test_marked_child_is_dropped_and_order_is_kept() {
    let shelf = Model::new(&shelf_class(), Value::Nil).unwrap();
    let books = shelf.association("books").unwrap();
    let first = books.build(json!({"title": "A"})).unwrap();
    let second = books.build(json!({"title": "B"})).unwrap();
    let third = books.build(json!({"title": "C"})).unwrap();
    second.mark_for_destruction();

    shelf.mark_persisted();
    assert!(books.apply_changes().unwrap());

    assert_eq!(stored_titles(&shelf), titles(&["A", "C"]));
    let destroyed = books.as_embeds_many().unwrap().destroyed();
    assert_eq!(destroyed.len(), 1);
    assert!(destroyed[0].ptr_eq(&second));
    assert!(first.is_persisted());
    assert!(third.is_persisted());
    assert_eq!(target_titles(&shelf), titles(&["A", "C"]));
}

#[test]
fn test_new_children_are_inserted_among_persisted_siblings() {
    let shelf = Model::instantiate(&shelf_class(), json!({"books": [{"title": "A"}, {"title": "B"}]})).unwrap();
    let books = shelf.association("books").unwrap();
    books.build(json!({"title": "C"})).unwrap();

    assert!(shelf.save().unwrap());
    assert_eq!(stored_titles(&shelf), titles(&["A", "B", "C"]));
    assert!(!shelf.is_changed());
}

#[test]
fn test_destroy_then_re_add_moves_child_to_the_end() {
    let shelf = Model::instantiate(
        &shelf_class(),
        json!({"books": [{"title": "A"}, {"title": "B"}, {"title": "C"}]}),
    )
    .unwrap();
    let books = shelf.association("books").unwrap();
    let many = books.as_embeds_many().unwrap().clone();
    let b = many.target().unwrap()[1].clone();

    assert!(b.destroy().unwrap());
    assert_eq!(stored_titles(&shelf), titles(&["A", "C"]));
    assert!(b.is_destroyed());

    many.concat(vec![b.clone()]).unwrap();
    assert!(b.is_new_record());
    assert_eq!(target_titles(&shelf), titles(&["A", "C", "B"]));

    assert!(shelf.save().unwrap());
    assert_eq!(stored_titles(&shelf), titles(&["A", "C", "B"]));
    assert!(b.is_persisted());
}

#[test]
fn test_failed_child_leaves_earlier_siblings_saved() {
    let shelf = Model::new(&shelf_class(), Value::Nil).unwrap();
    let books = shelf.association("books").unwrap();
    let good = books.build(json!({"title": "A"})).unwrap();
    let bad = books.build(json!({"title": ""})).unwrap();

    assert!(!books.apply_changes().unwrap());
    assert!(good.is_persisted());
    assert!(bad.is_new_record());
    assert_eq!(stored_titles(&shelf), titles(&["A"]));

    let strict = books.apply_changes_strict();
    assert!(matches!(strict, Err(ModelError::AssociationChangesNotApplied { .. })));
    assert_eq!(stored_titles(&shelf), titles(&["A"]));
}

#[test]
fn test_owner_save_is_halted_by_invalid_child() {
    let shelf = Model::new(&shelf_class(), Value::Nil).unwrap();
    shelf.association("books").unwrap().build(json!({"title": ""})).unwrap();

    assert!(!shelf.save().unwrap());
    assert_eq!(shelf.errors().get("books.0.title"), ["can't be blank"]);
    assert!(shelf.is_new_record());
    assert_eq!(shelf.read_attribute("books").unwrap(), Value::Nil);

    let strict = shelf.save_strict();
    assert!(matches!(strict, Err(ModelError::Validation(_))));
}

#[test]
fn test_replace_with_wrong_type_rolls_back() {
    let shelf = Model::instantiate(&shelf_class(), json!({"books": [{"title": "A"}, {"title": "B"}]})).unwrap();
    let storage_before = shelf.read_attribute("books").unwrap();
    let target_before = target_titles(&shelf);

    let author_class = ModelClass::builder("Author").build().unwrap();
    let valid = Model::new(&book_class(), json!({"title": "C"})).unwrap();
    let wrong = Model::new(&author_class, Value::Nil).unwrap();

    let result = shelf.set("books", Value::Array(vec![valid.into(), wrong.into()]));
    assert!(matches!(result, Err(ModelError::AssociationTypeMismatch { .. })));
    assert_eq!(shelf.read_attribute("books").unwrap(), storage_before);
    assert_eq!(target_titles(&shelf), target_before);
    assert!(!shelf.is_changed());
}

#[test]
fn test_replace_clears_storage_until_saved() {
    let shelf = Model::instantiate(&shelf_class(), json!({"books": [{"title": "A"}]})).unwrap();
    let replacement = Model::new(&book_class(), json!({"title": "Z"})).unwrap();

    let many = shelf.association("books").unwrap().as_embeds_many().unwrap().clone();
    assert!(many.replace(vec![replacement.clone()]).unwrap());
    assert!(stored_titles(&shelf).is_empty());
    assert_eq!(target_titles(&shelf), titles(&["Z"]));

    assert!(shelf.save().unwrap());
    assert_eq!(stored_titles(&shelf), titles(&["Z"]));
    assert!(replacement.embedder().unwrap().ptr_eq(&shelf));
}

#[test]
fn test_apply_changes_twice_changes_nothing() {
    let shelf = Model::new(&shelf_class(), Value::Nil).unwrap();
    let books = shelf.association("books").unwrap();
    books.build(json!({"title": "A"})).unwrap();
    books.build(json!({"title": "B"})).unwrap();
    assert!(shelf.save().unwrap());

    let storage = shelf.read_attribute("books").unwrap();
    assert!(books.apply_changes().unwrap());
    assert_eq!(shelf.read_attribute("books").unwrap(), storage);
    assert!(!shelf.is_changed());
    assert_eq!(target_titles(&shelf), titles(&["A", "B"]));
    assert!(books.as_embeds_many().unwrap().destroyed().is_empty());
}

#[test]
fn test_json_encoded_backing_attribute_is_decoded() {
    let shelf = Model::instantiate(&shelf_class(), json!({"books": "[{\"title\": \"A\"}]"})).unwrap();
    assert_eq!(target_titles(&shelf), titles(&["A"]));
}

#[test]
fn test_embeds_one_writes_and_clears_storage() {
    let address = ModelClass::builder("Address")
        .attribute(AttributeReflection::new("city", Type::String))
        .build()
        .unwrap();
    let profile_class = ModelClass::builder("Profile")
        .embeds_one("address", &address)
        .define_save(|_| Ok(true))
        .build()
        .unwrap();
    let profile = Model::new(&profile_class, Value::Nil).unwrap();

    let home = profile
        .association("address")
        .unwrap()
        .build(json!({"city": "Oslo"}))
        .unwrap();
    assert!(profile.save().unwrap());
    assert_eq!(
        profile.read_attribute("address").unwrap(),
        Value::from(json!({"city": "Oslo"}))
    );

    home.mark_for_destruction();
    assert!(profile.save().unwrap());
    assert_eq!(profile.read_attribute("address").unwrap(), Value::Nil);
    assert_eq!(profile.get("address").unwrap(), Value::Nil);
    assert!(home.is_destroyed());
}

#[test]
fn test_embeds_one_apply_changes_serializes_without_validating() {
    let address = ModelClass::builder("Address")
        .attribute(AttributeReflection::new("city", Type::String))
        .validates("city", Validator::Presence)
        .build()
        .unwrap();
    let profile_class = ModelClass::builder("Profile")
        .embeds_one("address", &address)
        .define_save(|_| Ok(true))
        .build()
        .unwrap();
    let profile = Model::new(&profile_class, Value::Nil).unwrap();
    let association = profile.association("address").unwrap();
    let blank = association.build(json!({"city": ""})).unwrap();

    assert!(association.apply_changes().unwrap());
    assert_eq!(
        profile.read_attribute("address").unwrap(),
        Value::from(json!({"city": ""}))
    );
    assert!(blank.is_persisted());

    // The owner's save still refuses the invalid child.
    assert!(!profile.save().unwrap());
    assert_eq!(profile.errors().get("address.city"), ["can't be blank"]);
}

#[test]
fn test_inline_class_is_named_after_owner() {
    let project = ModelClass::builder("Project")
        .embeds_many("line_items", modelgraph::Target::inline(|class| {
            class.attribute(AttributeReflection::new("sku", Type::String))
        }))
        .build()
        .unwrap();
    let reflection = project.association("line_items").unwrap();
    assert_eq!(reflection.klass().unwrap().name(), "Project::LineItem");
}

//! Attachment specifics on top of the owned-relation behavior
//!
//! Attachments are owned by `(attachment_id, attachment_type, field)`, so a
//! file belongs to exactly one relation of one parent. Visibility defaults
//! to the relation's `public` flag.

use super::relation::Relation;
use crate::model::Record;

pub const IS_PUBLIC: &str = "is_public";

impl<'a> Relation<'a> {
    /// Default the visibility of a file about to be attached
    pub(crate) fn prepare_attachment(&self, file: &Record) {
        if file.get(IS_PUBLIC).is_null() {
            file.set(IS_PUBLIC, self.definition.flags.public);
        }
    }
}

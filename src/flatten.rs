use lopdf::Document;

/// Drop `/AcroForm` from the catalog and prune whatever only it referenced.
///
/// Page content and widget annotations stay, so marks already drawn into
/// page content and existing widget appearances still render. Returns
/// whether the document had an interactive form.
pub fn flatten(doc: &mut Document) -> lopdf::Result<bool> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    if doc.get_dictionary_mut(root)?.remove(b"AcroForm").is_none() {
        return Ok(false);
    }
    let pruned = doc.prune_objects();
    tracing::debug!(pruned = pruned.len(), "removed interactive form");
    Ok(true)
}

use crate::error::CertPressError;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};

const OVERLAY_FORM_NAME: &str = "CP_OVL_1";

fn lopdf_err(err: lopdf::Error) -> CertPressError {
    CertPressError::Pdf(format!("pdf compose error: {err}"))
}

fn page_box(page: &lopdf::Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

fn page_resources_dict(page: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn page_xobject_dict(resources: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match resources.get(b"XObject") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn first_page_id(doc: &LoDocument, label: &str) -> Result<LoObjectId, CertPressError> {
    doc.get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| CertPressError::Pdf(format!("{label} PDF has no pages")))
}

/// Draws the first page of `overlay_pdf` over the first page of
/// `background_pdf` and returns the combined document.
///
/// The overlay is wrapped in a form XObject so its resources never clash
/// with the background's. Pages after the first are kept untouched.
pub(crate) fn stamp_overlay(
    background_pdf: &[u8],
    overlay_pdf: &[u8],
) -> Result<Vec<u8>, CertPressError> {
    let mut background = LoDocument::load_mem(background_pdf).map_err(lopdf_err)?;
    let mut overlay = LoDocument::load_mem(overlay_pdf).map_err(lopdf_err)?;
    if background.is_encrypted() {
        return Err(CertPressError::Pdf(
            "background PDF is encrypted".to_string(),
        ));
    }
    if overlay.is_encrypted() {
        return Err(CertPressError::Pdf("overlay PDF is encrypted".to_string()));
    }
    let background_page_id = first_page_id(&background, "background")?;

    overlay.renumber_objects_with(background.max_id + 1);
    let overlay_page_id = first_page_id(&overlay, "overlay")?;
    if overlay.max_id > background.max_id {
        background.max_id = overlay.max_id;
    }
    background.objects.extend(overlay.objects);

    let overlay_page = background
        .get_object(overlay_page_id)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?
        .clone();
    let overlay_content = background
        .get_page_content(overlay_page_id)
        .map_err(lopdf_err)?;
    let overlay_resources = page_resources_dict(&overlay_page, &background);

    let form_stream = LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => LoObject::Array(page_box(&overlay_page)),
            "Resources" => LoObject::Dictionary(overlay_resources),
        },
        overlay_content,
    );
    let form_id = background.add_object(form_stream);

    let page_dict = background
        .get_object(background_page_id)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?
        .clone();
    let mut resources = page_resources_dict(&page_dict, &background);
    let mut xobjects = page_xobject_dict(&resources, &background);
    xobjects.set(OVERLAY_FORM_NAME, LoObject::Reference(form_id));
    resources.set("XObject", LoObject::Dictionary(xobjects));
    {
        let page_mut = background
            .get_object_mut(background_page_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(lopdf_err)?;
        page_mut.set("Resources", LoObject::Dictionary(resources));
    }

    let do_content = format!("q /{} Do Q\n", OVERLAY_FORM_NAME).into_bytes();
    background
        .add_page_contents(background_page_id, do_content)
        .map_err(lopdf_err)?;

    background.prune_objects();
    background.renumber_objects();
    background.compress();
    let mut out = Vec::new();
    background
        .save_to(&mut out)
        .map_err(|err| CertPressError::Pdf(format!("pdf save error: {err}")))?;
    Ok(out)
}

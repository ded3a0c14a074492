//! Expected shape of an observation-zone KML document.
//!
//! ```text
//! kml
//! └── Document
//!     └── Folder
//!         └── Placemark (one or more)
//!             ├── name
//!             └── Polygon | MultiGeometry/Polygon
//!                 └── outerBoundaryIs/LinearRing/coordinates
//! ```

use super::xml::XmlElement;
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmlDocument {
    pub placemarks: Vec<Placemark>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placemark {
    /// Text of the `<name>` element; `None` when the element is empty.
    pub name: Option<String>,
    /// Raw `<coordinates>` text of the outer boundary.
    pub coordinates: String,
}

/// Map a parsed tree onto [`KmlDocument`], or report the first mismatch.
pub fn validate(root: &XmlElement) -> Result<KmlDocument, ValidationError> {
    if root.name != "kml" {
        return Err(ValidationError::new(
            "kml",
            format!("expected root element <kml>, found <{}>", root.name),
        ));
    }

    let document = single(root, "Document", "kml")?;
    let folder = single(document, "Folder", "kml.Document")?;

    let path = "kml.Document.Folder.Placemark";
    let placemarks = folder
        .children_named("Placemark")
        .enumerate()
        .map(|(index, node)| placemark(node, &format!("{path}[{index}]")))
        .collect::<Result<Vec<_>, _>>()?;

    if placemarks.is_empty() {
        return Err(ValidationError::missing(path));
    }

    Ok(KmlDocument { placemarks })
}

fn placemark(node: &XmlElement, path: &str) -> Result<Placemark, ValidationError> {
    let name = node
        .child("name")
        .ok_or_else(|| ValidationError::missing(format!("{path}.name")))?
        .text()
        .map(str::to_string);

    let (polygon, polygon_path) = if let Some(polygon) = node.child("Polygon") {
        (polygon, format!("{path}.Polygon"))
    } else if let Some(multi) = node.child("MultiGeometry") {
        let multi_path = format!("{path}.MultiGeometry");
        let polygon = multi
            .child("Polygon")
            .ok_or_else(|| ValidationError::missing(format!("{multi_path}.Polygon")))?;
        (polygon, format!("{multi_path}.Polygon"))
    } else {
        return Err(ValidationError::new(
            path,
            "expected a Polygon or MultiGeometry element",
        ));
    };

    let boundary_path = format!("{polygon_path}.outerBoundaryIs");
    let ring_path = format!("{boundary_path}.LinearRing");
    let coordinates_path = format!("{ring_path}.coordinates");

    let coordinates = polygon
        .child("outerBoundaryIs")
        .ok_or_else(|| ValidationError::missing(&boundary_path))?
        .child("LinearRing")
        .ok_or_else(|| ValidationError::missing(&ring_path))?
        .child("coordinates")
        .ok_or_else(|| ValidationError::missing(&coordinates_path))?
        .text()
        .ok_or_else(|| ValidationError::new(&coordinates_path, "expected coordinate text"))?
        .to_string();

    Ok(Placemark { name, coordinates })
}

/// The one child called `name`; absence and repetition are both mismatches.
fn single<'a>(
    parent: &'a XmlElement,
    name: &str,
    parent_path: &str,
) -> Result<&'a XmlElement, ValidationError> {
    let path = format!("{parent_path}.{name}");
    let mut matches = parent.children_named(name);

    let first = matches
        .next()
        .ok_or_else(|| ValidationError::missing(&path))?;
    let extra = matches.count();
    if extra > 0 {
        return Err(ValidationError::new(
            path,
            format!("expected a single element, found {}", extra + 1),
        ));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kml::xml::parse;

    fn validate_str(input: &str) -> Result<KmlDocument, ValidationError> {
        validate(&parse(input).unwrap())
    }

    const POLYGON: &str = "<Polygon><outerBoundaryIs><LinearRing>\
        <coordinates>-121.75,47.43 -121.76,47.44 -121.75,47.43</coordinates>\
        </LinearRing></outerBoundaryIs></Polygon>";

    fn wrap(placemarks: &str) -> String {
        format!("<kml><Document><Folder>{placemarks}</Folder></Document></kml>")
    }

    #[test]
    fn accepts_polygon_and_multigeometry() {
        let doc = validate_str(&wrap(&format!(
            "<Placemark><name>Snoqualmie</name>{POLYGON}</Placemark>\
             <Placemark><name>Stevens</name><MultiGeometry>{POLYGON}{POLYGON}</MultiGeometry></Placemark>"
        )))
        .unwrap();

        assert_eq!(doc.placemarks.len(), 2);
        assert_eq!(doc.placemarks[0].name.as_deref(), Some("Snoqualmie"));
        assert_eq!(
            doc.placemarks[1].coordinates,
            "-121.75,47.43 -121.76,47.44 -121.75,47.43"
        );
    }

    #[test]
    fn single_placemark_is_a_list_of_one() {
        let doc = validate_str(&wrap(&format!("<Placemark><name>A</name>{POLYGON}</Placemark>")))
            .unwrap();
        assert_eq!(doc.placemarks.len(), 1);
    }

    #[test]
    fn empty_name_passes_document_validation() {
        let doc = validate_str(&wrap(&format!("<Placemark><name/>{POLYGON}</Placemark>"))).unwrap();
        assert_eq!(doc.placemarks[0].name, None);
    }

    #[test]
    fn reports_path_of_missing_structure() {
        let err = validate_str("<kml><Document/></kml>").unwrap_err();
        assert_eq!(err, ValidationError::missing("kml.Document.Folder"));

        let err = validate_str(&wrap("")).unwrap_err();
        assert_eq!(err, ValidationError::missing("kml.Document.Folder.Placemark"));

        let err = validate_str(&wrap(&format!(
            "<Placemark><name>A</name>{POLYGON}</Placemark><Placemark>{POLYGON}</Placemark>"
        )))
        .unwrap_err();
        assert_eq!(err.path, "kml.Document.Folder.Placemark[1].name");

        let err = validate_str(&wrap(
            "<Placemark><name>A</name><Polygon><outerBoundaryIs/></Polygon></Placemark>",
        ))
        .unwrap_err();
        assert_eq!(
            err.path,
            "kml.Document.Folder.Placemark[0].Polygon.outerBoundaryIs.LinearRing"
        );
    }

    #[test]
    fn rejects_wrong_root_and_repeated_folders() {
        let err = validate_str("<gpx/>").unwrap_err();
        assert_eq!(err.path, "kml");

        let err = validate_str("<kml><Document><Folder/><Folder/></Document></kml>").unwrap_err();
        assert_eq!(err.path, "kml.Document.Folder");
        assert!(err.reason.contains("found 2"));
    }

    #[test]
    fn point_placemark_is_rejected() {
        let err = validate_str(&wrap(
            "<Placemark><name>Station</name><Point><coordinates>1,2</coordinates></Point></Placemark>",
        ))
        .unwrap_err();
        assert_eq!(err.path, "kml.Document.Folder.Placemark[0]");
    }
}

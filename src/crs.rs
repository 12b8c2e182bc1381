use crate::domain::{CrsPolicy, SpatialReference};
use crate::error::PointpackError;

const WGS84_GEOGCS: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";
const GDM2000_GEOGCS: &str = "GEOGCS[\"GCS_GDM_2000\",DATUM[\"D_GDM_2000\",SPHEROID[\"GRS_1980\",6378137.0,298.257222101]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

/// Turns user CRS input into a [`SpatialReference`].
///
/// Validity is syntactic only: any positive integer code is accepted without
/// consulting a registry.
pub fn resolve(raw: &str, policy: CrsPolicy) -> Result<SpatialReference, PointpackError> {
    if raw.trim().is_empty() {
        return match policy {
            CrsPolicy::DefaultWgs84 => Ok(SpatialReference::WGS84),
            CrsPolicy::RequireExplicit => Err(PointpackError::MissingCrs),
        };
    }
    raw.parse()
}

/// ESRI WKT for the `.prj` sidecar, for the codes we can describe offline:
/// 4326, 3857 and the GDM2000 presets 3376 and 3380.
pub fn prj_wkt(spatial_reference: SpatialReference) -> Option<String> {
    match spatial_reference.code() {
        4326 => Some(WGS84_GEOGCS.to_string()),
        3857 => Some(format!(
            "PROJCS[\"WGS_1984_Web_Mercator_Auxiliary_Sphere\",{WGS84_GEOGCS},\
             PROJECTION[\"Mercator_Auxiliary_Sphere\"],\
             PARAMETER[\"False_Easting\",0.0],PARAMETER[\"False_Northing\",0.0],\
             PARAMETER[\"Central_Meridian\",0.0],PARAMETER[\"Standard_Parallel_1\",0.0],\
             PARAMETER[\"Auxiliary_Sphere_Type\",0.0],UNIT[\"Meter\",1.0]]"
        )),
        3376 => Some(format!(
            "PROJCS[\"GDM_2000_East_Malaysia_BRSO\",{GDM2000_GEOGCS},\
             PROJECTION[\"Rectified_Skew_Orthomorphic_Natural_Origin\"],\
             PARAMETER[\"False_Easting\",0.0],PARAMETER[\"False_Northing\",0.0],\
             PARAMETER[\"Scale_Factor\",0.99984],PARAMETER[\"Azimuth\",53.31580995],\
             PARAMETER[\"Longitude_Of_Center\",115.0],PARAMETER[\"Latitude_Of_Center\",4.0],\
             PARAMETER[\"XY_Plane_Rotation\",53.13010236111111],UNIT[\"Meter\",1.0]]"
        )),
        3380 => Some(format!(
            "PROJCS[\"GDM_2000_Selangor_Grid\",{GDM2000_GEOGCS},\
             PROJECTION[\"Cassini\"],\
             PARAMETER[\"False_Easting\",-21759.438],PARAMETER[\"False_Northing\",55960.906],\
             PARAMETER[\"Central_Meridian\",101.3894333333333],PARAMETER[\"Scale_Factor\",1.0],\
             PARAMETER[\"Latitude_Of_Origin\",3.680350222222222],UNIT[\"Meter\",1.0]]"
        )),
        _ => None,
    }
}

//! Catalogue of the Amazon Advertising resources the service understands.

use std::fmt;

/// Which family of Amazon Advertising APIs a resource belongs to.
///
/// The two families disagree on identifier types (integers vs strings),
/// date fields, entity state fields and list pagination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Api {
    SponsoredAds,
    Dsp,
}

impl Api {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Api::SponsoredAds => "sa",
            Api::Dsp => "dsp",
        }
    }
}

#[derive(Debug)]
pub struct Endpoint {
    pub slug: &'static str,
    pub api: Api,
    pub path: &'static str,
    /// Identifier fields in key order. More than one field means a compound key.
    pub key: &'static [&'static str],
    pub archivable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    SpCampaigns,
    SpAdGroups,
    SpKeywords,
    SpNegativeKeywords,
    SpTargets,
    SpProductAds,
    SbCampaigns,
    SbKeywords,
    SdCampaigns,
    SdAdGroups,
    SdTargets,
    Portfolios,
    DspOrders,
    DspLineItems,
    DspLineItemCreatives,
}

const fn sa(
    slug: &'static str,
    path: &'static str,
    key: &'static [&'static str],
) -> Endpoint {
    Endpoint {
        slug,
        api: Api::SponsoredAds,
        path,
        key,
        archivable: true,
    }
}

const fn dsp(
    slug: &'static str,
    path: &'static str,
    key: &'static [&'static str],
) -> Endpoint {
    Endpoint {
        slug,
        api: Api::Dsp,
        path,
        key,
        archivable: false,
    }
}

static SP_CAMPAIGNS: Endpoint = sa("sp/campaigns", "/v2/sp/campaigns", &["campaignId"]);
static SP_AD_GROUPS: Endpoint = sa("sp/adGroups", "/v2/sp/adGroups", &["adGroupId"]);
static SP_KEYWORDS: Endpoint = sa("sp/keywords", "/v2/sp/keywords", &["keywordId"]);
static SP_NEGATIVE_KEYWORDS: Endpoint =
    sa("sp/negativeKeywords", "/v2/sp/negativeKeywords", &["keywordId"]);
static SP_TARGETS: Endpoint = sa("sp/targets", "/v2/sp/targets", &["targetId"]);
static SP_PRODUCT_ADS: Endpoint = sa("sp/productAds", "/v2/sp/productAds", &["adId"]);
static SB_CAMPAIGNS: Endpoint = sa("sb/campaigns", "/sb/campaigns", &["campaignId"]);
static SB_KEYWORDS: Endpoint = sa("sb/keywords", "/sb/keywords", &["keywordId"]);
static SD_CAMPAIGNS: Endpoint = sa("sd/campaigns", "/sd/campaigns", &["campaignId"]);
static SD_AD_GROUPS: Endpoint = sa("sd/adGroups", "/sd/adGroups", &["adGroupId"]);
static SD_TARGETS: Endpoint = sa("sd/targets", "/sd/targets", &["targetId"]);
static PORTFOLIOS: Endpoint = sa("sa/portfolios", "/v2/portfolios", &["portfolioId"]);
static DSP_ORDERS: Endpoint = dsp("dsp/orders", "/dsp/orders", &["orderId"]);
static DSP_LINE_ITEMS: Endpoint = dsp("dsp/lineItems", "/dsp/lineItems", &["lineItemId"]);
static DSP_LINE_ITEM_CREATIVES: Endpoint = dsp(
    "dsp/lineItemCreatives",
    "/dsp/lineItemCreativeAssociations",
    &["lineItemId", "creativeId"],
);

impl Resource {
    pub const ALL: &'static [Resource] = &[
        Resource::SpCampaigns,
        Resource::SpAdGroups,
        Resource::SpKeywords,
        Resource::SpNegativeKeywords,
        Resource::SpTargets,
        Resource::SpProductAds,
        Resource::SbCampaigns,
        Resource::SbKeywords,
        Resource::SdCampaigns,
        Resource::SdAdGroups,
        Resource::SdTargets,
        Resource::Portfolios,
        Resource::DspOrders,
        Resource::DspLineItems,
        Resource::DspLineItemCreatives,
    ];

    pub fn endpoint(&self) -> &'static Endpoint {
        match self {
            Resource::SpCampaigns => &SP_CAMPAIGNS,
            Resource::SpAdGroups => &SP_AD_GROUPS,
            Resource::SpKeywords => &SP_KEYWORDS,
            Resource::SpNegativeKeywords => &SP_NEGATIVE_KEYWORDS,
            Resource::SpTargets => &SP_TARGETS,
            Resource::SpProductAds => &SP_PRODUCT_ADS,
            Resource::SbCampaigns => &SB_CAMPAIGNS,
            Resource::SbKeywords => &SB_KEYWORDS,
            Resource::SdCampaigns => &SD_CAMPAIGNS,
            Resource::SdAdGroups => &SD_AD_GROUPS,
            Resource::SdTargets => &SD_TARGETS,
            Resource::Portfolios => &PORTFOLIOS,
            Resource::DspOrders => &DSP_ORDERS,
            Resource::DspLineItems => &DSP_LINE_ITEMS,
            Resource::DspLineItemCreatives => &DSP_LINE_ITEM_CREATIVES,
        }
    }

    /// Looks a resource up by its `api/name` slug, e.g. `sp/campaigns`.
    pub fn from_slug(slug: &str) -> Option<Resource> {
        let slug = slug.trim_matches('/');
        Resource::ALL.iter().copied().find(|r| r.endpoint().slug == slug)
    }

    pub fn slug(&self) -> &'static str {
        self.endpoint().slug
    }

    pub fn api(&self) -> Api {
        self.endpoint().api
    }

    pub fn key_fields(&self) -> &'static [&'static str] {
        self.endpoint().key
    }

    /// The most specific identifier field; performance metrics are keyed by it.
    pub fn primary_id_field(&self) -> &'static str {
        let key = self.key_fields();
        key[key.len() - 1]
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
